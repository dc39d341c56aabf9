use super::ChangeDetector;
use crate::model::{Change, EntityKind, EventType, Player, PlayerClan};

/// Detects profile changes of a player
pub struct PlayerDetector;

const PLAYER_EVENTS: &[EventType] = &[
    EventType::PlayerNameChanged,
    EventType::PlayerRoleChanged,
    EventType::PlayerClanChanged,
    EventType::PlayerTownHallChanged,
];

impl ChangeDetector for PlayerDetector {
    type Entity = Player;

    fn event_order() -> &'static [EventType] {
        PLAYER_EVENTS
    }

    fn changes_of(event_type: EventType, old: &Player, new: &Player) -> Vec<Change> {
        let message = match event_type {
            EventType::PlayerNameChanged if old.name != new.name => {
                Some(format!("Name changed from {} to {}", old.name, new.name))
            }
            EventType::PlayerRoleChanged => role_change(old, new),
            EventType::PlayerClanChanged => clan_change(old.clan.as_ref(), new.clan.as_ref()),
            EventType::PlayerTownHallChanged if old.town_hall_level != new.town_hall_level => {
                Some(format!(
                    "Town hall level changed from {} to {}",
                    old.town_hall_level, new.town_hall_level
                ))
            }
            _ => None,
        };

        message
            .map(|m| vec![Change::new(event_type, EntityKind::Player, &new.tag, m)])
            .unwrap_or_default()
    }
}

fn clan_label(clan: Option<&PlayerClan>) -> String {
    match clan {
        Some(c) => format!("{} ({})", c.name, c.tag),
        None => "no clan".to_string(),
    }
}

fn clan_name(clan: Option<&PlayerClan>) -> &str {
    clan.map_or("unknown clan", |c| c.name.as_str())
}

/// Role moves that come with joining or leaving are described in clan terms
fn role_change(old: &Player, new: &Player) -> Option<String> {
    match (old.role, new.role) {
        (None, Some(to)) => Some(format!(
            "Joined clan {} with role {to}",
            clan_name(new.clan.as_ref())
        )),
        (Some(_), None) => Some(format!("Left clan {}", clan_name(old.clan.as_ref()))),
        (Some(from), Some(to)) if from != to => Some(format!("Role changed from {from} to {to}")),
        _ => None,
    }
}

fn clan_change(old: Option<&PlayerClan>, new: Option<&PlayerClan>) -> Option<String> {
    match (old, new) {
        (None, Some(joined)) => Some(format!("Joined clan {}", clan_label(Some(joined)))),
        (Some(left), None) => Some(format!("Left clan {}", clan_label(Some(left)))),
        (Some(from), Some(to)) if from.tag != to.tag => Some(format!(
            "Clan changed from {} to {}",
            clan_label(Some(from)),
            clan_label(Some(to))
        )),
        _ => None,
    }
}
