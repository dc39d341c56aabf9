//! Change events and the event type catalog

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::Tag;
use crate::Error;

/// Kind of tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Clan,
    Player,
    War,
}

impl EntityKind {
    /// Stable storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Clan => "clan",
            EntityKind::Player => "player",
            EntityKind::War => "war",
        }
    }

    /// Kind that owns audit records about this kind
    ///
    /// War events are logged against the clan that fought the war.
    pub fn audit_owner(&self) -> EntityKind {
        match self {
            EntityKind::War => EntityKind::Clan,
            other => *other,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clan" => Ok(EntityKind::Clan),
            "player" => Ok(EntityKind::Player),
            "war" => Ok(EntityKind::War),
            other => Err(Error::Other(format!("unknown entity kind: {other}"))),
        }
    }
}

/// Grouping used when browsing an entity's history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryCategory {
    /// Name, description, level and similar profile fields
    Profile,
    /// Joins, leaves and role changes
    Membership,
    /// War lifecycle and attacks
    War,
    /// Everything
    All,
}

impl HistoryCategory {
    /// Whether an event type belongs to this category
    pub fn includes(&self, event_type: EventType) -> bool {
        *self == HistoryCategory::All || event_type.category() == *self
    }

    /// Event types in this category, in catalog order
    pub fn event_types(&self) -> Vec<EventType> {
        EventType::ALL
            .iter()
            .copied()
            .filter(|t| self.includes(*t))
            .collect()
    }
}

/// Catalog of every change the system records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "&'static str", try_from = "String")]
pub enum EventType {
    ClanNameChanged,
    ClanDescriptionChanged,
    ClanLevelChanged,
    ClanWarLogVisibilityChanged,
    ClanLocationChanged,
    ClanReformed,
    ClanDisbanded,
    MemberLeft,
    MemberJoined,
    MemberRoleChanged,
    MemberTownHallChanged,
    PlayerNameChanged,
    PlayerRoleChanged,
    PlayerClanChanged,
    PlayerTownHallChanged,
    NewWar,
    NewWarJustStarted,
    WarBegin,
    WarEnd,
    WarClanChange,
    WarClanStarsChange,
    WarOpponentStarsChange,
    WarAttacksChange,
    PlayerAttacked,
    /// Entity was registered for tracking
    EntityAdded,
}

impl EventType {
    /// Every event type, in catalog order
    pub const ALL: [EventType; 25] = [
        EventType::ClanNameChanged,
        EventType::ClanDescriptionChanged,
        EventType::ClanLevelChanged,
        EventType::ClanWarLogVisibilityChanged,
        EventType::ClanLocationChanged,
        EventType::ClanReformed,
        EventType::ClanDisbanded,
        EventType::MemberLeft,
        EventType::MemberJoined,
        EventType::MemberRoleChanged,
        EventType::MemberTownHallChanged,
        EventType::PlayerNameChanged,
        EventType::PlayerRoleChanged,
        EventType::PlayerClanChanged,
        EventType::PlayerTownHallChanged,
        EventType::NewWar,
        EventType::NewWarJustStarted,
        EventType::WarBegin,
        EventType::WarEnd,
        EventType::WarClanChange,
        EventType::WarClanStarsChange,
        EventType::WarOpponentStarsChange,
        EventType::WarAttacksChange,
        EventType::PlayerAttacked,
        EventType::EntityAdded,
    ];

    /// Name stored in the audit log
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ClanNameChanged => "clan_name_changed",
            EventType::ClanDescriptionChanged => "clan_description_changed",
            EventType::ClanLevelChanged => "clan_level_changed",
            EventType::ClanWarLogVisibilityChanged => "clan_war_log_visibility_changed",
            EventType::ClanLocationChanged => "clan_location_changed",
            EventType::ClanReformed => "clan_reformed",
            EventType::ClanDisbanded => "clan_disbanded",
            EventType::MemberLeft => "member_left",
            EventType::MemberJoined => "member_joined",
            EventType::MemberRoleChanged => "member_role_changed",
            EventType::MemberTownHallChanged => "member_th_level_changed",
            EventType::PlayerNameChanged => "player_name_changed",
            EventType::PlayerRoleChanged => "player_role_changed",
            EventType::PlayerClanChanged => "player_clan_changed",
            EventType::PlayerTownHallChanged => "player_town_hall_changed",
            EventType::NewWar => "newWar",
            EventType::NewWarJustStarted => "newWarJustStarted",
            EventType::WarBegin => "warBegin",
            EventType::WarEnd => "warEnd",
            EventType::WarClanChange => "warClanChange",
            EventType::WarClanStarsChange => "warClanStarsChange",
            EventType::WarOpponentStarsChange => "warOpponentStarsChange",
            EventType::WarAttacksChange => "warAttacksChange",
            EventType::PlayerAttacked => "playerAttacked",
            EventType::EntityAdded => "ADD",
        }
    }

    /// Look up an event type by its stored name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }

    /// History category of this event type
    pub fn category(&self) -> HistoryCategory {
        match self {
            EventType::MemberLeft
            | EventType::MemberJoined
            | EventType::MemberRoleChanged
            | EventType::MemberTownHallChanged
            | EventType::PlayerRoleChanged
            | EventType::PlayerClanChanged => HistoryCategory::Membership,
            EventType::NewWar
            | EventType::NewWarJustStarted
            | EventType::WarBegin
            | EventType::WarEnd
            | EventType::WarClanChange
            | EventType::WarClanStarsChange
            | EventType::WarOpponentStarsChange
            | EventType::WarAttacksChange
            | EventType::PlayerAttacked => HistoryCategory::War,
            _ => HistoryCategory::Profile,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<EventType> for &'static str {
    fn from(event_type: EventType) -> Self {
        event_type.as_str()
    }
}

impl TryFrom<String> for EventType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| Error::Other(format!("unknown event type: {s}")))
    }
}

/// Change descriptor produced by the detectors
///
/// Detectors are pure, so a `Change` carries no timestamp; it becomes a
/// [`ChangeEvent`] when dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub event_type: EventType,
    /// Entity the audit record is filed under
    pub subject_tag: Tag,
    pub subject_kind: EntityKind,
    /// Secondary entity involved, e.g. the member who joined
    pub related_tag: Option<Tag>,
    pub message: String,
}

impl Change {
    pub fn new(
        event_type: EventType,
        subject_kind: EntityKind,
        subject_tag: &Tag,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            subject_tag: subject_tag.clone(),
            subject_kind,
            related_tag: None,
            message: message.into(),
        }
    }

    pub fn with_related(mut self, tag: &Tag) -> Self {
        self.related_tag = Some(tag.clone());
        self
    }
}

/// Detected change, stamped and ready for auditing
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub event_type: EventType,
    pub subject_tag: Tag,
    pub subject_kind: EntityKind,
    pub related_tag: Option<Tag>,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
    /// Entity JSON the change was observed on
    pub raw: Arc<Value>,
}

impl ChangeEvent {
    pub fn new(change: Change, occurred_at: DateTime<Utc>, raw: Arc<Value>) -> Self {
        Self {
            event_type: change.event_type,
            subject_tag: change.subject_tag,
            subject_kind: change.subject_kind,
            related_tag: change.related_tag,
            message: change.message,
            occurred_at,
            raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_names_are_unique_and_parse_back() {
        for event_type in EventType::ALL {
            assert_eq!(EventType::from_name(event_type.as_str()), Some(event_type));
        }
        let mut names: Vec<_> = EventType::ALL.iter().map(|t| t.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), EventType::ALL.len());
    }

    #[test]
    fn categories() {
        assert_eq!(EventType::ClanNameChanged.category(), HistoryCategory::Profile);
        assert_eq!(EventType::MemberJoined.category(), HistoryCategory::Membership);
        assert_eq!(EventType::MemberTownHallChanged.category(), HistoryCategory::Membership);
        assert_eq!(EventType::PlayerAttacked.category(), HistoryCategory::War);
        assert_eq!(EventType::EntityAdded.category(), HistoryCategory::Profile);
        assert!(HistoryCategory::All.includes(EventType::WarEnd));
        assert!(!HistoryCategory::War.includes(EventType::MemberLeft));
        assert_eq!(HistoryCategory::All.event_types().len(), EventType::ALL.len());
    }

    #[test]
    fn serde_uses_stored_names() {
        let json = serde_json::to_string(&EventType::EntityAdded).unwrap();
        assert_eq!(json, "\"ADD\"");
        let parsed: EventType = serde_json::from_str("\"warEnd\"").unwrap();
        assert_eq!(parsed, EventType::WarEnd);
    }

    #[test]
    fn war_events_are_owned_by_clans() {
        assert_eq!(EntityKind::War.audit_owner(), EntityKind::Clan);
        assert_eq!(EntityKind::Player.audit_owner(), EntityKind::Player);
    }
}
