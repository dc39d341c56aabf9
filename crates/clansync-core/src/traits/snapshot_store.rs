// # Snapshot Store Trait
//
// Keeps the last known JSON of every entity, keyed by kind and internal id.
// Snapshots are written at baseline registration and after each handled
// change; they are served back when the remote source is in maintenance.

use async_trait::async_trait;
use serde_json::Value;

use crate::model::{EntityKind, EntitySnapshot};

/// Trait for snapshot store implementations
///
/// War snapshots are stored under [`EntityKind::War`] with the internal id
/// of the clan that fought the war.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Get the stored snapshot
    async fn get_snapshot(
        &self,
        kind: EntityKind,
        internal_id: i64,
    ) -> Result<Option<EntitySnapshot>, crate::Error>;

    /// Whether a snapshot exists
    async fn has_snapshot(&self, kind: EntityKind, internal_id: i64) -> Result<bool, crate::Error> {
        Ok(self.get_snapshot(kind, internal_id).await?.is_some())
    }

    /// Create or overwrite the snapshot in place
    async fn put_snapshot(
        &self,
        kind: EntityKind,
        internal_id: i64,
        snapshot: &Value,
    ) -> Result<(), crate::Error>;
}
