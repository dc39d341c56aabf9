//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so that text ordering matches time ordering. Tags are stored without the
//! leading `#`.

use chrono::{DateTime, SecondsFormat, Utc};
use clansync_core::model::{
    AuditLogRecord, EntityKind, EventType, Tag, TrackedEntity, WarLogRecord, WarPhase,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_kind(s: &str) -> Result<EntityKind> {
    Ok(s.parse()?)
}

pub fn decode_event_type(s: &str) -> Result<EventType> {
    EventType::from_name(s).ok_or_else(|| Error::Decode(format!("unknown event type: {s:?}")))
}

pub fn decode_phase(s: &str) -> Result<WarPhase> {
    WarPhase::from_name(s).ok_or_else(|| Error::Decode(format!("unknown war state: {s:?}")))
}

// ─── Rows ────────────────────────────────────────────────────────────────────

pub const ENTITY_COLUMNS: &str =
    "entity_id, kind, tag, is_to_be_tracked, first_seen, last_synced";

/// `tracked_entity` row as read inside a connection call
pub struct RawEntity {
    entity_id: i64,
    kind: String,
    tag: String,
    is_to_be_tracked: bool,
    first_seen: String,
    last_synced: String,
}

impl RawEntity {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            entity_id: row.get(0)?,
            kind: row.get(1)?,
            tag: row.get(2)?,
            is_to_be_tracked: row.get(3)?,
            first_seen: row.get(4)?,
            last_synced: row.get(5)?,
        })
    }

    pub fn decode(self) -> Result<TrackedEntity> {
        Ok(TrackedEntity {
            kind: decode_kind(&self.kind)?,
            tag: Tag::parse(&self.tag)?,
            internal_id: self.entity_id,
            is_to_be_tracked: self.is_to_be_tracked,
            first_seen: decode_dt(&self.first_seen)?,
            last_synced: decode_dt(&self.last_synced)?,
        })
    }
}

pub const AUDIT_COLUMNS: &str = "audit_id, owner_id, owner_kind, event_type, detail, added_on";

/// `audit_log` row as read inside a connection call
pub struct RawAudit {
    audit_id: i64,
    owner_id: i64,
    owner_kind: String,
    event_type: String,
    detail: String,
    added_on: String,
}

impl RawAudit {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            audit_id: row.get(0)?,
            owner_id: row.get(1)?,
            owner_kind: row.get(2)?,
            event_type: row.get(3)?,
            detail: row.get(4)?,
            added_on: row.get(5)?,
        })
    }

    pub fn decode(self) -> Result<AuditLogRecord> {
        Ok(AuditLogRecord {
            id: Some(self.audit_id),
            owner_id: self.owner_id,
            owner_kind: decode_kind(&self.owner_kind)?,
            event_type: decode_event_type(&self.event_type)?,
            detail: self.detail,
            added_on: decode_dt(&self.added_on)?,
        })
    }
}

/// Column values of an audit record about to be inserted
pub struct AuditParams {
    pub owner_id: i64,
    pub owner_kind: &'static str,
    pub event_type: &'static str,
    pub detail: String,
    pub added_on: String,
}

impl From<&AuditLogRecord> for AuditParams {
    fn from(record: &AuditLogRecord) -> Self {
        Self {
            owner_id: record.owner_id,
            owner_kind: record.owner_kind.as_str(),
            event_type: record.event_type.as_str(),
            detail: record.detail.clone(),
            added_on: encode_dt(record.added_on),
        }
    }
}

pub const WAR_COLUMNS: &str = "war_id, owner_id, start_time, end_time, opponent_tag, \
     opponent_name, opponent_league, clan_stars, opponent_stars, state, war";

/// `war_log` row as read inside a connection call
pub struct RawWar {
    war_id: i64,
    owner_id: i64,
    start_time: String,
    end_time: String,
    opponent_tag: String,
    opponent_name: String,
    opponent_league: Option<String>,
    clan_stars: u32,
    opponent_stars: u32,
    state: String,
    war: String,
}

impl RawWar {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            war_id: row.get(0)?,
            owner_id: row.get(1)?,
            start_time: row.get(2)?,
            end_time: row.get(3)?,
            opponent_tag: row.get(4)?,
            opponent_name: row.get(5)?,
            opponent_league: row.get(6)?,
            clan_stars: row.get(7)?,
            opponent_stars: row.get(8)?,
            state: row.get(9)?,
            war: row.get(10)?,
        })
    }

    pub fn decode(self) -> Result<WarLogRecord> {
        Ok(WarLogRecord {
            id: Some(self.war_id),
            owner_id: self.owner_id,
            start_time: decode_dt(&self.start_time)?,
            end_time: decode_dt(&self.end_time)?,
            opponent_tag: Tag::parse(&self.opponent_tag)?,
            opponent_name: self.opponent_name,
            opponent_league: self.opponent_league,
            clan_stars: self.clan_stars,
            opponent_stars: self.opponent_stars,
            state: decode_phase(&self.state)?,
            war: serde_json::from_str(&self.war)?,
        })
    }
}

/// Column values of a war log row about to be written
pub struct WarParams {
    pub owner_id: i64,
    pub start_time: String,
    pub end_time: String,
    pub opponent_tag: String,
    pub opponent_name: String,
    pub opponent_league: Option<String>,
    pub clan_stars: u32,
    pub opponent_stars: u32,
    pub state: &'static str,
    pub war: String,
}

impl WarParams {
    pub fn encode(record: &WarLogRecord) -> Result<Self> {
        Ok(Self {
            owner_id: record.owner_id,
            start_time: encode_dt(record.start_time),
            end_time: encode_dt(record.end_time),
            opponent_tag: record.opponent_tag.as_str().to_owned(),
            opponent_name: record.opponent_name.clone(),
            opponent_league: record.opponent_league.clone(),
            clan_stars: record.clan_stars,
            opponent_stars: record.opponent_stars,
            state: record.state.as_str(),
            war: serde_json::to_string(&record.war)?,
        })
    }
}
