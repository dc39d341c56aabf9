// # War Log Store Trait
//
// One row per war a tracked clan fought, identified by
// (clan, start time, end time, opponent tag). Repeated observations of the
// same war update that row instead of adding new ones.

use async_trait::async_trait;

use crate::model::{WarKey, WarLogRecord, WarUpsert};

/// Trait for war log implementations
#[async_trait]
pub trait WarLogStore: Send + Sync {
    /// Find a war by its identity
    async fn find_war(&self, key: &WarKey) -> Result<Option<WarLogRecord>, crate::Error>;

    /// Insert a new war row, returning its id
    async fn insert_war(&self, record: &WarLogRecord) -> Result<i64, crate::Error>;

    /// Overwrite the mutable fields of an existing war row
    async fn update_war(&self, id: i64, record: &WarLogRecord) -> Result<(), crate::Error>;

    /// Find-or-insert by identity, updating the row when it exists
    async fn upsert_war(&self, record: &WarLogRecord) -> Result<WarUpsert, crate::Error> {
        match self.find_war(&record.key()).await? {
            Some(existing) => {
                let id = existing.id.ok_or_else(|| {
                    crate::Error::storage("stored war row has no id")
                })?;
                self.update_war(id, record).await?;
                Ok(WarUpsert::Updated(id))
            }
            None => Ok(WarUpsert::Inserted(self.insert_war(record).await?)),
        }
    }

    /// Most recent wars of a clan, newest first
    async fn war_log(&self, owner_id: i64, limit: usize) -> Result<Vec<WarLogRecord>, crate::Error>;
}
