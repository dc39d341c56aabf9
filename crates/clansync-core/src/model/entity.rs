//! Clan and player entities as returned by the remote source

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::Tag;

/// Member role inside a clan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    /// Player is not in a clan
    NotMember,
    /// Regular member
    Member,
    /// Elder (the API calls it "admin")
    Admin,
    /// Co-leader
    CoLeader,
    /// Leader
    Leader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Role::NotMember => "not a member",
            Role::Member => "member",
            Role::Admin => "elder",
            Role::CoLeader => "co-leader",
            Role::Leader => "leader",
        };
        f.write_str(label)
    }
}

/// Clan location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Upstream location id
    #[serde(default)]
    pub id: Option<u64>,
    /// Display name
    pub name: String,
    /// Fields we do not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Entry of a clan's member list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanMember {
    pub tag: Tag,
    #[serde(default)]
    pub name: String,
    /// Absent while upstream is still settling a membership change
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub town_hall_level: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Clan snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clan {
    pub tag: Tag,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "clanLevel")]
    pub level: u32,
    #[serde(default)]
    pub is_war_log_public: bool,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub member_count: u32,
    #[serde(default)]
    pub members: Vec<ClanMember>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Clan {
    /// Create an empty clan with only its tag and name set
    pub fn new(tag: Tag, name: impl Into<String>) -> Self {
        Self {
            tag,
            name: name.into(),
            description: String::new(),
            level: 1,
            is_war_log_public: false,
            location: None,
            member_count: 0,
            members: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Location name, if the clan has one
    pub fn location_name(&self) -> Option<&str> {
        self.location.as_ref().map(|l| l.name.as_str())
    }
}

/// Clan summary embedded in a player profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerClan {
    pub tag: Tag,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Player snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub tag: Tag,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub clan: Option<PlayerClan>,
    #[serde(default)]
    pub town_hall_level: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Player {
    /// Create a clanless player
    pub fn new(tag: Tag, name: impl Into<String>, town_hall_level: u32) -> Self {
        Self {
            tag,
            name: name.into(),
            role: None,
            clan: None,
            town_hall_level,
            extra: Map::new(),
        }
    }

    /// Tag of the player's current clan
    pub fn clan_tag(&self) -> Option<&Tag> {
        self.clan.as_ref().map(|c| &c.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clan_keeps_unknown_fields() {
        let raw = json!({
            "tag": "#2PP",
            "name": "Alpha",
            "clanLevel": 7,
            "isWarLogPublic": true,
            "memberCount": 1,
            "members": [{ "tag": "#P1", "name": "one", "role": "admin", "trophies": 4000 }],
            "badgeUrls": { "small": "x" }
        });
        let clan: Clan = serde_json::from_value(raw).unwrap();
        assert_eq!(clan.level, 7);
        assert_eq!(clan.members[0].role, Some(Role::Admin));
        assert!(clan.extra.contains_key("badgeUrls"));
        assert!(clan.members[0].extra.contains_key("trophies"));

        let back = serde_json::to_value(&clan).unwrap();
        assert_eq!(back["badgeUrls"]["small"], "x");
    }

    #[test]
    fn missing_optional_fields_default() {
        let clan: Clan = serde_json::from_value(json!({ "tag": "#2PP" })).unwrap();
        assert!(clan.location.is_none());
        assert!(clan.members.is_empty());

        let player: Player = serde_json::from_value(json!({ "tag": "#P1", "name": "x" })).unwrap();
        assert!(player.clan_tag().is_none());
        assert!(player.role.is_none());
    }

    #[test]
    fn role_display_uses_game_names() {
        assert_eq!(Role::Admin.to_string(), "elder");
        assert_eq!(Role::CoLeader.to_string(), "co-leader");
    }
}
