// # Entity Registry Trait
//
// Defines the interface to the set of entities the system knows about and
// the flag that decides which of them are polled.
//
// Every entity gets a stable internal id on first registration. Audit
// records, snapshots and war log rows all reference that id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{EntityKind, Registration, Tag, TrackedEntity};

/// Trait for entity registry implementations
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait EntityRegistry: Send + Sync {
    /// Tags of the entities marked for tracking, oldest first
    async fn tracked_tags(&self, kind: EntityKind) -> Result<Vec<Tag>, crate::Error>;

    /// Look up an entity by tag
    ///
    /// # Returns
    ///
    /// - `Ok(Some(TrackedEntity))`: The entity is registered
    /// - `Ok(None)`: Unknown tag
    /// - `Err(Error)`: Storage error
    async fn lookup(&self, kind: EntityKind, tag: &Tag) -> Result<Option<TrackedEntity>, crate::Error>;

    /// Find or create an entity
    ///
    /// A new entity is created with `is_to_be_tracked = track`. An existing
    /// entity is upgraded to tracked when `track` is set, but never
    /// downgraded.
    async fn register(
        &self,
        kind: EntityKind,
        tag: &Tag,
        track: bool,
    ) -> Result<Registration, crate::Error>;

    /// Set the tracking flag
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: Flag updated
    /// - `Ok(false)`: Unknown tag
    async fn set_tracked(&self, kind: EntityKind, tag: &Tag, track: bool) -> Result<bool, crate::Error>;

    /// Record the time the entity was last synchronized
    async fn mark_synced(
        &self,
        kind: EntityKind,
        tag: &Tag,
        at: DateTime<Utc>,
    ) -> Result<(), crate::Error>;
}
