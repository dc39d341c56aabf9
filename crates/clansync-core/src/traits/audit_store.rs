// # Audit Store Trait
//
// Durable, append-only log of change events. Written in batches by the
// `AuditSink`; read back per entity when browsing history.

use async_trait::async_trait;

use crate::model::{AuditLogRecord, EntityKind, HistoryCategory, Tag};

/// Trait for audit store implementations
///
/// # Batch semantics
///
/// [`append_batch`](AuditStore::append_batch) is all-or-nothing: either
/// every record of the batch is written, or none is.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Test whether storage is reachable
    ///
    /// Called before every flush. A `false` result aborts the flush and
    /// leaves the queue untouched.
    async fn ping(&self) -> bool;

    /// Resolve the internal id of an audit record owner
    ///
    /// # Returns
    ///
    /// - `Ok(Some(id))`: Owner is registered
    /// - `Ok(None)`: Owner unknown; the record cannot be written
    /// - `Err(Error)`: Storage error
    async fn resolve_owner(&self, kind: EntityKind, tag: &Tag) -> Result<Option<i64>, crate::Error>;

    /// Append a batch of records in a single transaction
    async fn append_batch(&self, records: &[AuditLogRecord]) -> Result<(), crate::Error>;

    /// Most recent records of one owner, newest first
    ///
    /// # Parameters
    ///
    /// - `owner_id`: Internal id of the owner
    /// - `category`: Restricts the event types returned
    /// - `limit`: Maximum number of records
    async fn history(
        &self,
        owner_id: i64,
        category: HistoryCategory,
        limit: usize,
    ) -> Result<Vec<AuditLogRecord>, crate::Error>;
}
