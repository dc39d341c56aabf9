//! Clan war entities
//!
//! War timestamps arrive in the compact form `20240101T120000.000Z`; the
//! [`war_time`] module reads and writes that form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

use super::Tag;

/// Upstream war state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WarState {
    NotInWar,
    Preparation,
    InWar,
    WarEnded,
}

/// Lifecycle phase used when diffing two war observations
///
/// `None` stands for "no war known": either nothing was observed yet or
/// upstream reports `notInWar`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WarPhase {
    None,
    Preparation,
    InWar,
    WarEnded,
}

impl WarPhase {
    /// Phase of an optional war observation
    pub fn of(war: Option<&War>) -> Self {
        match war.map(|w| w.state) {
            None | Some(WarState::NotInWar) => WarPhase::None,
            Some(WarState::Preparation) => WarPhase::Preparation,
            Some(WarState::InWar) => WarPhase::InWar,
            Some(WarState::WarEnded) => WarPhase::WarEnded,
        }
    }

    /// Stable storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            WarPhase::None => "none",
            WarPhase::Preparation => "preparation",
            WarPhase::InWar => "inWar",
            WarPhase::WarEnded => "warEnded",
        }
    }

    /// Parse a stored phase name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(WarPhase::None),
            "preparation" => Some(WarPhase::Preparation),
            "inWar" => Some(WarPhase::InWar),
            "warEnded" => Some(WarPhase::WarEnded),
            _ => None,
        }
    }
}

impl fmt::Display for WarPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named label such as a war league
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
}

/// Single attack made during a war
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attack {
    pub attacker_tag: Tag,
    pub defender_tag: Tag,
    #[serde(default)]
    pub stars: u32,
    #[serde(default)]
    pub destruction_percentage: f64,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub duration: u32,
}

/// War participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarMember {
    pub tag: Tag,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub map_position: u32,
    #[serde(default)]
    pub town_hall_level: u32,
    #[serde(default)]
    pub attacks: Vec<Attack>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One side of a war
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarClan {
    pub tag: Tag,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub stars: u32,
    #[serde(default)]
    pub attacks: u32,
    #[serde(default)]
    pub destruction_percentage: f64,
    #[serde(default, alias = "warLeague")]
    pub league: Option<Label>,
    #[serde(default)]
    pub members: Vec<WarMember>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WarClan {
    /// Create a war side with no members
    pub fn new(tag: Tag, name: impl Into<String>) -> Self {
        Self {
            tag,
            name: name.into(),
            stars: 0,
            attacks: 0,
            destruction_percentage: 0.0,
            league: None,
            members: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// Outcome of a finished war from the tracked clan's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarResult {
    Win,
    Lose,
    Tie,
}

impl fmt::Display for WarResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WarResult::Win => "win",
            WarResult::Lose => "lose",
            WarResult::Tie => "tie",
        })
    }
}

/// Current war of a clan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct War {
    pub state: WarState,
    #[serde(default)]
    pub team_size: u32,
    #[serde(default, with = "war_time::option")]
    pub preparation_start_time: Option<DateTime<Utc>>,
    #[serde(default, with = "war_time::option")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, with = "war_time::option")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub clan: Option<WarClan>,
    #[serde(default)]
    pub opponent: Option<WarClan>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl War {
    /// War report for a clan that is not at war
    pub fn not_in_war() -> Self {
        Self {
            state: WarState::NotInWar,
            team_size: 0,
            preparation_start_time: None,
            start_time: None,
            end_time: None,
            clan: None,
            opponent: None,
            extra: Map::new(),
        }
    }

    /// Lifecycle phase of this observation
    pub fn phase(&self) -> WarPhase {
        WarPhase::of(Some(self))
    }

    /// Opponent tag, if matched
    pub fn opponent_tag(&self) -> Option<&Tag> {
        self.opponent.as_ref().map(|o| &o.tag)
    }

    /// Stars earned by the tracked clan
    pub fn clan_stars(&self) -> u32 {
        self.clan.as_ref().map_or(0, |c| c.stars)
    }

    /// Stars earned by the opponent
    pub fn opponent_stars(&self) -> u32 {
        self.opponent.as_ref().map_or(0, |c| c.stars)
    }

    /// Attacks used by (clan, opponent)
    pub fn attack_counts(&self) -> (u32, u32) {
        (
            self.clan.as_ref().map_or(0, |c| c.attacks),
            self.opponent.as_ref().map_or(0, |c| c.attacks),
        )
    }

    /// Result by stars, then destruction
    pub fn result(&self) -> WarResult {
        let ours = self.clan.as_ref();
        let theirs = self.opponent.as_ref();
        let by_stars = self.clan_stars().cmp(&self.opponent_stars());
        let ordering = if by_stars == Ordering::Equal {
            let ours = ours.map_or(0.0, |c| c.destruction_percentage);
            let theirs = theirs.map_or(0.0, |c| c.destruction_percentage);
            ours.partial_cmp(&theirs).unwrap_or(Ordering::Equal)
        } else {
            by_stars
        };

        match ordering {
            Ordering::Greater => WarResult::Win,
            Ordering::Less => WarResult::Lose,
            Ordering::Equal => WarResult::Tie,
        }
    }
}

/// Serde helpers for the compact war timestamp format
pub mod war_time {
    use chrono::{DateTime, NaiveDateTime, Utc};

    /// Format used by the remote source
    pub const FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

    /// Parse a compact timestamp, falling back to RFC 3339
    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(raw, FORMAT)
            .map(|naive| naive.and_utc())
            .ok()
            .or_else(|| {
                DateTime::parse_from_rfc3339(raw)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            })
    }

    /// Render a timestamp in compact form
    pub fn format(at: &DateTime<Utc>) -> String {
        at.format(FORMAT).to_string()
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(at) => serializer.serialize_str(&super::format(at)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw: Option<String> = Option::deserialize(deserializer)?;
            match raw {
                None => Ok(None),
                Some(s) => super::parse(&s)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid war time: {s}"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_compact_timestamps() {
        let war: War = serde_json::from_value(json!({
            "state": "inWar",
            "teamSize": 5,
            "startTime": "20240101T120000.000Z",
            "endTime": "20240102T120000.000Z",
            "clan": { "tag": "#2PP", "name": "Alpha", "stars": 10, "attacks": 7 },
            "opponent": { "tag": "#8QQ", "name": "Beta", "stars": 9, "attacks": 8 }
        }))
        .unwrap();

        let start = war.start_time.unwrap();
        assert_eq!(war_time::format(&start), "20240101T120000.000Z");
        assert_eq!(war.phase(), WarPhase::InWar);
        assert_eq!(war.attack_counts(), (7, 8));
        assert_eq!(war.result(), WarResult::Win);

        let back = serde_json::to_value(&war).unwrap();
        assert_eq!(back["endTime"], "20240102T120000.000Z");
    }

    #[test]
    fn not_in_war_is_phase_none() {
        let war: War = serde_json::from_value(json!({ "state": "notInWar" })).unwrap();
        assert_eq!(war.phase(), WarPhase::None);
        assert_eq!(WarPhase::of(None), WarPhase::None);
        assert!(war.opponent_tag().is_none());
    }

    #[test]
    fn ties_break_on_destruction() {
        let mut war = War::not_in_war();
        war.state = WarState::WarEnded;
        let mut ours = WarClan::new(Tag::parse("#2PP").unwrap(), "Alpha");
        let mut theirs = WarClan::new(Tag::parse("#8QQ").unwrap(), "Beta");
        ours.stars = 12;
        theirs.stars = 12;
        ours.destruction_percentage = 80.0;
        theirs.destruction_percentage = 85.5;
        war.clan = Some(ours);
        war.opponent = Some(theirs);
        assert_eq!(war.result(), WarResult::Lose);
    }

    #[test]
    fn phase_names_round_trip() {
        for phase in [WarPhase::None, WarPhase::Preparation, WarPhase::InWar, WarPhase::WarEnded] {
            assert_eq!(WarPhase::from_name(phase.as_str()), Some(phase));
        }
    }
}
