//! [`SqliteStore`]: the SQLite implementation of the clan sync storage traits.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use serde_json::Value;
use tracing::{debug, warn};

use clansync_core::model::{
    AuditLogRecord, EntityKind, EntitySnapshot, HistoryCategory, Registration, Tag, TrackedEntity,
    WarKey, WarLogRecord,
};
use clansync_core::traits::{AuditStore, EntityRegistry, SnapshotStore, WarLogStore};

use crate::{
    encode::{
        decode_dt, encode_dt, AuditParams, RawAudit, RawEntity, RawWar, WarParams, AUDIT_COLUMNS,
        ENTITY_COLUMNS, WAR_COLUMNS,
    },
    schema::SCHEMA,
    Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Clan sync storage backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
    conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
    /// Open (or create) a store at `path` and run schema initialisation.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open(path).await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory store, useful for testing.
    pub async fn open_in_memory() -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // ─── Registry ────────────────────────────────────────────────────────────

    async fn query_tracked_tags(&self, kind: EntityKind) -> Result<Vec<Tag>> {
        let kind = kind.as_str();
        let raw: Vec<String> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT tag FROM tracked_entity
                      WHERE kind = ?1 AND is_to_be_tracked = 1
                      ORDER BY entity_id",
                )?;
                let tags = stmt
                    .query_map(rusqlite::params![kind], |r| r.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(tags)
            })
            .await?;

        raw.iter()
            .map(|t| Tag::parse(t).map_err(Error::from))
            .collect()
    }

    async fn query_entity(&self, kind: EntityKind, tag: &Tag) -> Result<Option<TrackedEntity>> {
        let kind = kind.as_str();
        let tag = tag.as_str().to_owned();
        let raw = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        &format!(
                            "SELECT {ENTITY_COLUMNS} FROM tracked_entity WHERE kind = ?1 AND tag = ?2"
                        ),
                        rusqlite::params![kind, tag],
                        RawEntity::from_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;

        raw.map(RawEntity::decode).transpose()
    }

    async fn insert_or_track(&self, kind: EntityKind, tag: &Tag, track: bool) -> Result<Registration> {
        let kind = kind.as_str();
        let tag = tag.as_str().to_owned();
        let now = encode_dt(Utc::now());

        let (raw, created) = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let inserted = tx.execute(
                    "INSERT INTO tracked_entity (kind, tag, is_to_be_tracked, first_seen, last_synced)
                     VALUES (?1, ?2, ?3, ?4, ?4)
                     ON CONFLICT (kind, tag) DO NOTHING",
                    rusqlite::params![kind, tag, track, now],
                )?;
                if inserted == 0 && track {
                    tx.execute(
                        "UPDATE tracked_entity SET is_to_be_tracked = 1 WHERE kind = ?1 AND tag = ?2",
                        rusqlite::params![kind, tag],
                    )?;
                }
                let row = tx.query_row(
                    &format!(
                        "SELECT {ENTITY_COLUMNS} FROM tracked_entity WHERE kind = ?1 AND tag = ?2"
                    ),
                    rusqlite::params![kind, tag],
                    RawEntity::from_row,
                )?;
                tx.commit()?;
                Ok((row, inserted > 0))
            })
            .await?;

        Ok(Registration {
            entity: raw.decode()?,
            created,
        })
    }

    async fn update_tracked(&self, kind: EntityKind, tag: &Tag, track: bool) -> Result<bool> {
        let kind = kind.as_str();
        let tag = tag.as_str().to_owned();
        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE tracked_entity SET is_to_be_tracked = ?3 WHERE kind = ?1 AND tag = ?2",
                    rusqlite::params![kind, tag, track],
                )?)
            })
            .await?;
        Ok(changed > 0)
    }

    async fn update_synced(&self, kind: EntityKind, tag: &Tag, at: DateTime<Utc>) -> Result<()> {
        let kind = kind.as_str();
        let tag = tag.as_str().to_owned();
        let at = encode_dt(at);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE tracked_entity SET last_synced = ?3 WHERE kind = ?1 AND tag = ?2",
                    rusqlite::params![kind, tag, at],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // ─── Snapshots ───────────────────────────────────────────────────────────

    async fn query_snapshot(&self, kind: EntityKind, internal_id: i64) -> Result<Option<EntitySnapshot>> {
        let kind_str = kind.as_str();
        let raw: Option<(String, String)> = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT snapshot, last_updated FROM entity_snapshot
                          WHERE kind = ?1 AND entity_id = ?2",
                        rusqlite::params![kind_str, internal_id],
                        |r| Ok((r.get(0)?, r.get(1)?)),
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;

        let Some((snapshot, last_updated)) = raw else {
            return Ok(None);
        };
        Ok(Some(EntitySnapshot {
            kind,
            internal_id,
            snapshot: serde_json::from_str(&snapshot)?,
            last_updated: decode_dt(&last_updated)?,
        }))
    }

    async fn upsert_snapshot(&self, kind: EntityKind, internal_id: i64, snapshot: &Value) -> Result<()> {
        let kind = kind.as_str();
        let json = serde_json::to_string(snapshot)?;
        let now = encode_dt(Utc::now());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO entity_snapshot (kind, entity_id, snapshot, last_updated)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (kind, entity_id)
                     DO UPDATE SET snapshot = excluded.snapshot, last_updated = excluded.last_updated",
                    rusqlite::params![kind, internal_id, json, now],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // ─── Audit log ───────────────────────────────────────────────────────────

    async fn insert_audit_batch(&self, records: &[AuditLogRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let rows: Vec<AuditParams> = records.iter().map(AuditParams::from).collect();
        let count = rows.len();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare_cached(
                        "INSERT INTO audit_log (owner_id, owner_kind, event_type, detail, added_on)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                    )?;
                    for row in &rows {
                        stmt.execute(rusqlite::params![
                            row.owner_id,
                            row.owner_kind,
                            row.event_type,
                            row.detail,
                            row.added_on,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;

        debug!("Appended {} audit record(s)", count);
        Ok(())
    }

    async fn query_history(
        &self,
        owner_id: i64,
        category: HistoryCategory,
        limit: usize,
    ) -> Result<Vec<AuditLogRecord>> {
        let types = category.event_types();
        let placeholders = (0..types.len())
            .map(|i| format!("?{}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log
              WHERE owner_id = ?1 AND event_type IN ({placeholders})
              ORDER BY added_on DESC, audit_id DESC
              LIMIT ?2"
        );

        let mut values: Vec<rusqlite::types::Value> = vec![
            owner_id.into(),
            i64::try_from(limit).unwrap_or(i64::MAX).into(),
        ];
        values.extend(types.iter().map(|t| t.as_str().to_owned().into()));

        let raw: Vec<RawAudit> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(values.iter()), RawAudit::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        raw.into_iter().map(RawAudit::decode).collect()
    }

    // ─── War log ─────────────────────────────────────────────────────────────

    async fn query_war(&self, key: &WarKey) -> Result<Option<WarLogRecord>> {
        let owner_id = key.owner_id;
        let start = encode_dt(key.start_time);
        let end = encode_dt(key.end_time);
        let opponent = key.opponent_tag.as_str().to_owned();

        let raw = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        &format!(
                            "SELECT {WAR_COLUMNS} FROM war_log
                              WHERE owner_id = ?1 AND start_time = ?2
                                AND end_time = ?3 AND opponent_tag = ?4"
                        ),
                        rusqlite::params![owner_id, start, end, opponent],
                        RawWar::from_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;

        raw.map(RawWar::decode).transpose()
    }

    async fn insert_war_row(&self, record: &WarLogRecord) -> Result<i64> {
        let p = WarParams::encode(record)?;
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO war_log (owner_id, start_time, end_time, opponent_tag, opponent_name,
                                          opponent_league, clan_stars, opponent_stars, state, war)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    rusqlite::params![
                        p.owner_id,
                        p.start_time,
                        p.end_time,
                        p.opponent_tag,
                        p.opponent_name,
                        p.opponent_league,
                        p.clan_stars,
                        p.opponent_stars,
                        p.state,
                        p.war,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    async fn update_war_row(&self, id: i64, record: &WarLogRecord) -> Result<()> {
        let p = WarParams::encode(record)?;
        let changed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE war_log
                        SET opponent_name = ?2, opponent_league = ?3, clan_stars = ?4,
                            opponent_stars = ?5, state = ?6, war = ?7
                      WHERE war_id = ?1",
                    rusqlite::params![
                        id,
                        p.opponent_name,
                        p.opponent_league,
                        p.clan_stars,
                        p.opponent_stars,
                        p.state,
                        p.war,
                    ],
                )?)
            })
            .await?;

        if changed == 0 {
            return Err(Error::WarNotFound(id));
        }
        Ok(())
    }

    async fn query_war_log(&self, owner_id: i64, limit: usize) -> Result<Vec<WarLogRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let raw: Vec<RawWar> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {WAR_COLUMNS} FROM war_log
                      WHERE owner_id = ?1
                      ORDER BY start_time DESC, war_id DESC
                      LIMIT ?2"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![owner_id, limit], RawWar::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        raw.into_iter().map(RawWar::decode).collect()
    }
}

// ─── Trait impls ─────────────────────────────────────────────────────────────

#[async_trait]
impl EntityRegistry for SqliteStore {
    async fn tracked_tags(&self, kind: EntityKind) -> Result<Vec<Tag>, clansync_core::Error> {
        Ok(self.query_tracked_tags(kind).await?)
    }

    async fn lookup(&self, kind: EntityKind, tag: &Tag) -> Result<Option<TrackedEntity>, clansync_core::Error> {
        Ok(self.query_entity(kind, tag).await?)
    }

    async fn register(&self, kind: EntityKind, tag: &Tag, track: bool) -> Result<Registration, clansync_core::Error> {
        Ok(self.insert_or_track(kind, tag, track).await?)
    }

    async fn set_tracked(&self, kind: EntityKind, tag: &Tag, track: bool) -> Result<bool, clansync_core::Error> {
        Ok(self.update_tracked(kind, tag, track).await?)
    }

    async fn mark_synced(&self, kind: EntityKind, tag: &Tag, at: DateTime<Utc>) -> Result<(), clansync_core::Error> {
        Ok(self.update_synced(kind, tag, at).await?)
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn get_snapshot(
        &self,
        kind: EntityKind,
        internal_id: i64,
    ) -> Result<Option<EntitySnapshot>, clansync_core::Error> {
        Ok(self.query_snapshot(kind, internal_id).await?)
    }

    async fn put_snapshot(&self, kind: EntityKind, internal_id: i64, snapshot: &Value) -> Result<(), clansync_core::Error> {
        Ok(self.upsert_snapshot(kind, internal_id, snapshot).await?)
    }
}

#[async_trait]
impl AuditStore for SqliteStore {
    async fn ping(&self) -> bool {
        let result = self
            .conn
            .call(|conn| Ok(conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?))
            .await;
        match result {
            Ok(_) => true,
            Err(e) => {
                warn!("SQLite ping failed: {}", e);
                false
            }
        }
    }

    async fn resolve_owner(&self, kind: EntityKind, tag: &Tag) -> Result<Option<i64>, clansync_core::Error> {
        Ok(self
            .query_entity(kind, tag)
            .await?
            .map(|entity| entity.internal_id))
    }

    async fn append_batch(&self, records: &[AuditLogRecord]) -> Result<(), clansync_core::Error> {
        Ok(self.insert_audit_batch(records).await?)
    }

    async fn history(
        &self,
        owner_id: i64,
        category: HistoryCategory,
        limit: usize,
    ) -> Result<Vec<AuditLogRecord>, clansync_core::Error> {
        Ok(self.query_history(owner_id, category, limit).await?)
    }
}

#[async_trait]
impl WarLogStore for SqliteStore {
    async fn find_war(&self, key: &WarKey) -> Result<Option<WarLogRecord>, clansync_core::Error> {
        Ok(self.query_war(key).await?)
    }

    async fn insert_war(&self, record: &WarLogRecord) -> Result<i64, clansync_core::Error> {
        Ok(self.insert_war_row(record).await?)
    }

    async fn update_war(&self, id: i64, record: &WarLogRecord) -> Result<(), clansync_core::Error> {
        Ok(self.update_war_row(id, record).await?)
    }

    async fn war_log(&self, owner_id: i64, limit: usize) -> Result<Vec<WarLogRecord>, clansync_core::Error> {
        Ok(self.query_war_log(owner_id, limit).await?)
    }
}

