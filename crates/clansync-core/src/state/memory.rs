// # Memory Storage
//
// In-memory implementation of every storage trait.
//
// ## Purpose
//
// Provides a simple, fast backend that doesn't persist across restarts.
// Useful for testing and for trial runs against the live API.
//
// ## Crash Behavior
//
// - All state is lost on restart/crash
// - Every tracked tag must be registered again after a restart
// - Queued audit records that were flushed are lost with the process
//
// ## Outage simulation
//
// `set_available(false)` makes `ping()` fail and every write return
// `Error::StorageUnavailable`, which lets tests exercise the audit retry
// path without a real database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::model::{
    AuditLogRecord, EntityKind, EntitySnapshot, HistoryCategory, Registration, Tag, TrackedEntity,
    WarKey, WarLogRecord,
};
use crate::traits::{AuditStore, EntityRegistry, SnapshotStore, WarLogStore};
use crate::Error;

#[derive(Debug, Default)]
struct Tables {
    entities: Vec<TrackedEntity>,
    snapshots: HashMap<(EntityKind, i64), EntitySnapshot>,
    audit: Vec<AuditLogRecord>,
    wars: Vec<WarLogRecord>,
    next_entity_id: i64,
    next_audit_id: i64,
    next_war_id: i64,
}

impl Tables {
    fn entity(&self, kind: EntityKind, tag: &Tag) -> Option<&TrackedEntity> {
        self.entities.iter().find(|e| e.kind == kind && &e.tag == tag)
    }

    fn entity_mut(&mut self, kind: EntityKind, tag: &Tag) -> Option<&mut TrackedEntity> {
        self.entities.iter_mut().find(|e| e.kind == kind && &e.tag == tag)
    }
}

/// In-memory storage backend
///
/// Implements [`EntityRegistry`], [`SnapshotStore`], [`AuditStore`] and
/// [`WarLogStore`] over a single `RwLock`, so clones share one data set.
///
/// # Example
///
/// ```rust,no_run
/// use clansync_core::state::MemoryStorage;
/// use clansync_core::traits::EntityRegistry;
/// use clansync_core::{EntityKind, Tag};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let storage = MemoryStorage::new();
///     let tag = Tag::parse("#2PP")?;
///
///     let registration = storage.register(EntityKind::Clan, &tag, true).await?;
///     assert!(registration.created);
///     assert_eq!(storage.tracked_tags(EntityKind::Clan).await?, vec![tag]);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    inner: Arc<RwLock<Tables>>,
    available: Arc<AtomicBool>,
}

impl MemoryStorage {
    /// Create a new empty storage
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Tables::default())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate losing or regaining the storage connection
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Every audit record written so far, in write order
    pub async fn audit_records(&self) -> Vec<AuditLogRecord> {
        self.inner.read().await.audit.clone()
    }

    /// Every war log row
    pub async fn war_records(&self) -> Vec<WarLogRecord> {
        self.inner.read().await.wars.clone()
    }

    fn ensure_available(&self) -> Result<(), Error> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::storage_unavailable("memory storage is offline"))
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityRegistry for MemoryStorage {
    async fn tracked_tags(&self, kind: EntityKind) -> Result<Vec<Tag>, Error> {
        self.ensure_available()?;
        let guard = self.inner.read().await;
        Ok(guard
            .entities
            .iter()
            .filter(|e| e.kind == kind && e.is_to_be_tracked)
            .map(|e| e.tag.clone())
            .collect())
    }

    async fn lookup(&self, kind: EntityKind, tag: &Tag) -> Result<Option<TrackedEntity>, Error> {
        self.ensure_available()?;
        Ok(self.inner.read().await.entity(kind, tag).cloned())
    }

    async fn register(&self, kind: EntityKind, tag: &Tag, track: bool) -> Result<Registration, Error> {
        self.ensure_available()?;
        let mut guard = self.inner.write().await;

        if let Some(existing) = guard.entity_mut(kind, tag) {
            if track {
                existing.is_to_be_tracked = true;
            }
            return Ok(Registration {
                entity: existing.clone(),
                created: false,
            });
        }

        guard.next_entity_id += 1;
        let now = Utc::now();
        let entity = TrackedEntity {
            kind,
            tag: tag.clone(),
            internal_id: guard.next_entity_id,
            is_to_be_tracked: track,
            first_seen: now,
            last_synced: now,
        };
        guard.entities.push(entity.clone());
        Ok(Registration {
            entity,
            created: true,
        })
    }

    async fn set_tracked(&self, kind: EntityKind, tag: &Tag, track: bool) -> Result<bool, Error> {
        self.ensure_available()?;
        let mut guard = self.inner.write().await;
        match guard.entity_mut(kind, tag) {
            Some(entity) => {
                entity.is_to_be_tracked = track;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_synced(&self, kind: EntityKind, tag: &Tag, at: DateTime<Utc>) -> Result<(), Error> {
        self.ensure_available()?;
        if let Some(entity) = self.inner.write().await.entity_mut(kind, tag) {
            entity.last_synced = at;
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStorage {
    async fn get_snapshot(
        &self,
        kind: EntityKind,
        internal_id: i64,
    ) -> Result<Option<EntitySnapshot>, Error> {
        self.ensure_available()?;
        Ok(self.inner.read().await.snapshots.get(&(kind, internal_id)).cloned())
    }

    async fn put_snapshot(&self, kind: EntityKind, internal_id: i64, snapshot: &Value) -> Result<(), Error> {
        self.ensure_available()?;
        self.inner.write().await.snapshots.insert(
            (kind, internal_id),
            EntitySnapshot {
                kind,
                internal_id,
                snapshot: snapshot.clone(),
                last_updated: Utc::now(),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl AuditStore for MemoryStorage {
    async fn ping(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn resolve_owner(&self, kind: EntityKind, tag: &Tag) -> Result<Option<i64>, Error> {
        self.ensure_available()?;
        Ok(self.inner.read().await.entity(kind, tag).map(|e| e.internal_id))
    }

    async fn append_batch(&self, records: &[AuditLogRecord]) -> Result<(), Error> {
        self.ensure_available()?;
        let mut guard = self.inner.write().await;
        for record in records {
            guard.next_audit_id += 1;
            let mut stored = record.clone();
            stored.id = Some(guard.next_audit_id);
            guard.audit.push(stored);
        }
        Ok(())
    }

    async fn history(
        &self,
        owner_id: i64,
        category: HistoryCategory,
        limit: usize,
    ) -> Result<Vec<AuditLogRecord>, Error> {
        self.ensure_available()?;
        let guard = self.inner.read().await;
        let mut rows: Vec<_> = guard
            .audit
            .iter()
            .filter(|r| r.owner_id == owner_id && category.includes(r.event_type))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.added_on.cmp(&a.added_on).then(b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows)
    }
}

#[async_trait]
impl WarLogStore for MemoryStorage {
    async fn find_war(&self, key: &WarKey) -> Result<Option<WarLogRecord>, Error> {
        self.ensure_available()?;
        let guard = self.inner.read().await;
        Ok(guard.wars.iter().find(|w| &w.key() == key).cloned())
    }

    async fn insert_war(&self, record: &WarLogRecord) -> Result<i64, Error> {
        self.ensure_available()?;
        let mut guard = self.inner.write().await;
        guard.next_war_id += 1;
        let id = guard.next_war_id;
        let mut stored = record.clone();
        stored.id = Some(id);
        guard.wars.push(stored);
        Ok(id)
    }

    async fn update_war(&self, id: i64, record: &WarLogRecord) -> Result<(), Error> {
        self.ensure_available()?;
        let mut guard = self.inner.write().await;
        let row = guard
            .wars
            .iter_mut()
            .find(|w| w.id == Some(id))
            .ok_or_else(|| Error::storage(format!("war {id} does not exist")))?;
        *row = WarLogRecord {
            id: Some(id),
            ..record.clone()
        };
        Ok(())
    }

    async fn war_log(&self, owner_id: i64, limit: usize) -> Result<Vec<WarLogRecord>, Error> {
        self.ensure_available()?;
        let guard = self.inner.read().await;
        let mut rows: Vec<_> = guard
            .wars
            .iter()
            .filter(|w| w.owner_id == owner_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        rows.truncate(limit);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventType, WarPhase};
    use chrono::TimeZone;
    use serde_json::json;

    fn tag(raw: &str) -> Tag {
        Tag::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn register_is_find_or_create() {
        let storage = MemoryStorage::new();
        let first = storage.register(EntityKind::Clan, &tag("#C1"), false).await.unwrap();
        assert!(first.created);
        assert!(!first.entity.is_to_be_tracked);

        let again = storage.register(EntityKind::Clan, &tag("#C1"), true).await.unwrap();
        assert!(!again.created);
        assert_eq!(again.entity.internal_id, first.entity.internal_id);
        assert!(again.entity.is_to_be_tracked);

        let downgrade = storage.register(EntityKind::Clan, &tag("#C1"), false).await.unwrap();
        assert!(downgrade.entity.is_to_be_tracked);

        let player = storage.register(EntityKind::Player, &tag("#C1"), false).await.unwrap();
        assert!(player.created);
        assert_ne!(player.entity.internal_id, first.entity.internal_id);
    }

    #[tokio::test]
    async fn snapshots_are_overwritten_in_place() {
        let storage = MemoryStorage::new();
        storage.put_snapshot(EntityKind::Clan, 1, &json!({ "v": 1 })).await.unwrap();
        storage.put_snapshot(EntityKind::Clan, 1, &json!({ "v": 2 })).await.unwrap();

        let snapshot = storage.get_snapshot(EntityKind::Clan, 1).await.unwrap().unwrap();
        assert_eq!(snapshot.snapshot["v"], 2);
        assert!(!storage.has_snapshot(EntityKind::Player, 1).await.unwrap());
    }

    #[tokio::test]
    async fn history_filters_and_orders() {
        let storage = MemoryStorage::new();
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let records: Vec<_> = [
            EventType::ClanNameChanged,
            EventType::MemberJoined,
            EventType::ClanLevelChanged,
        ]
        .iter()
        .enumerate()
        .map(|(i, t)| AuditLogRecord {
            id: None,
            owner_id: 1,
            owner_kind: EntityKind::Clan,
            event_type: *t,
            detail: format!("#{i}"),
            added_on: base + chrono::Duration::minutes(i as i64),
        })
        .collect();
        storage.append_batch(&records).await.unwrap();

        let profile = storage.history(1, HistoryCategory::Profile, 10).await.unwrap();
        let details: Vec<_> = profile.iter().map(|r| r.detail.as_str()).collect();
        assert_eq!(details, vec!["#2", "#0"]);

        let latest = storage.history(1, HistoryCategory::All, 1).await.unwrap();
        assert_eq!(latest[0].detail, "#2");
        assert!(storage.history(2, HistoryCategory::All, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn war_upsert_keeps_one_row() {
        let storage = MemoryStorage::new();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let mut record = WarLogRecord {
            id: None,
            owner_id: 1,
            start_time: start,
            end_time: start + chrono::Duration::days(1),
            opponent_tag: tag("#O1"),
            opponent_name: "Rival".into(),
            opponent_league: None,
            clan_stars: 0,
            opponent_stars: 0,
            state: WarPhase::Preparation,
            war: json!({}),
        };

        let first = storage.upsert_war(&record).await.unwrap();
        record.state = WarPhase::WarEnded;
        record.clan_stars = 30;
        let second = storage.upsert_war(&record).await.unwrap();

        assert!(matches!(first, crate::model::WarUpsert::Inserted(_)));
        assert_eq!(second, crate::model::WarUpsert::Updated(first.id()));
        let rows = storage.war_records().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].clan_stars, 30);
        assert_eq!(rows[0].state, WarPhase::WarEnded);
    }

    #[tokio::test]
    async fn offline_storage_rejects_writes() {
        let storage = MemoryStorage::new();
        storage.set_available(false);
        assert!(!storage.ping().await);
        let err = storage.append_batch(&[]).await.unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable(_)));
    }
}
