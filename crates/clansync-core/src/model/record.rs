//! Persistent records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{EntityKind, EventType, Tag, War, WarPhase};

/// Registry entry for an entity the system knows about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEntity {
    pub kind: EntityKind,
    pub tag: Tag,
    /// Stable storage-assigned id
    pub internal_id: i64,
    /// Whether discovery should pick the entity up for polling
    pub is_to_be_tracked: bool,
    pub first_seen: DateTime<Utc>,
    pub last_synced: DateTime<Utc>,
}

/// Result of registering an entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub entity: TrackedEntity,
    /// False when the entity already existed
    pub created: bool,
}

/// Last known JSON of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub kind: EntityKind,
    pub internal_id: i64,
    pub snapshot: Value,
    pub last_updated: DateTime<Utc>,
}

/// Audit record as written to storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogRecord {
    /// Storage id, `None` until written
    pub id: Option<i64>,
    pub owner_id: i64,
    pub owner_kind: EntityKind,
    pub event_type: EventType,
    pub detail: String,
    pub added_on: DateTime<Utc>,
}

/// Identity of a war in the war log
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WarKey {
    pub owner_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub opponent_tag: Tag,
}

/// War log row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarLogRecord {
    pub id: Option<i64>,
    pub owner_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub opponent_tag: Tag,
    pub opponent_name: String,
    pub opponent_league: Option<String>,
    pub clan_stars: u32,
    pub opponent_stars: u32,
    pub state: WarPhase,
    pub war: Value,
}

impl WarLogRecord {
    /// Build a war log row from a live war
    ///
    /// Returns `None` when the war lacks the fields that identify it
    /// (times or opponent), which is the case for `notInWar` reports.
    pub fn from_war(owner_id: i64, war: &War) -> Option<Self> {
        let opponent = war.opponent.as_ref()?;
        let start_time = war.start_time?;
        let end_time = war.end_time?;
        let war_json = serde_json::to_value(war).ok()?;

        Some(Self {
            id: None,
            owner_id,
            start_time,
            end_time,
            opponent_tag: opponent.tag.clone(),
            opponent_name: opponent.name.clone(),
            opponent_league: opponent.league.as_ref().map(|l| l.name.clone()),
            clan_stars: war.clan_stars(),
            opponent_stars: war.opponent_stars(),
            state: war.phase(),
            war: war_json,
        })
    }

    /// Identity of this row
    pub fn key(&self) -> WarKey {
        WarKey {
            owner_id: self.owner_id,
            start_time: self.start_time,
            end_time: self.end_time,
            opponent_tag: self.opponent_tag.clone(),
        }
    }
}

/// Outcome of a war log upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarUpsert {
    Inserted(i64),
    Updated(i64),
}

impl WarUpsert {
    pub fn id(&self) -> i64 {
        match self {
            WarUpsert::Inserted(id) | WarUpsert::Updated(id) => *id,
        }
    }
}
