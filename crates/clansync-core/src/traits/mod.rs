//! Core traits for the clan sync system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`EntitySource`]: Fetch and watch remote clans, players and wars
//! - [`EntityRegistry`]: Known entities and their tracking flag
//! - [`SnapshotStore`]: Last known JSON per entity
//! - [`AuditStore`]: Append-only change log
//! - [`WarLogStore`]: One row per war

pub mod audit_store;
pub mod entity_registry;
pub mod entity_source;
pub mod snapshot_store;
pub mod war_log_store;

pub use audit_store::AuditStore;
pub use entity_registry::EntityRegistry;
pub use entity_source::{EntitySource, Snapshot, SourceEvent};
pub use snapshot_store::SnapshotStore;
pub use war_log_store::WarLogStore;

use std::sync::Arc;

/// Every storage concern the orchestrator needs
///
/// Backends usually implement all four traits on one type; use
/// [`Storage::from_backend`] to share it.
#[derive(Clone)]
pub struct Storage {
    pub registry: Arc<dyn EntityRegistry>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub audit: Arc<dyn AuditStore>,
    pub wars: Arc<dyn WarLogStore>,
}

impl Storage {
    /// Use a single backend for every storage concern
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: EntityRegistry + SnapshotStore + AuditStore + WarLogStore + 'static,
    {
        Self {
            registry: backend.clone(),
            snapshots: backend.clone(),
            audit: backend.clone(),
            wars: backend,
        }
    }
}
