use serde::Serialize;

use super::ChangeDetector;
use crate::model::{Change, EntityKind, EventType, Tag, War, WarPhase};

/// War report of a clan at one point in time
///
/// `war` is `None` before the first report was seen.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarObservation {
    pub clan_tag: Tag,
    pub war: Option<War>,
}

impl WarObservation {
    pub fn new(clan_tag: Tag, war: Option<War>) -> Self {
        Self { clan_tag, war }
    }

    pub fn phase(&self) -> WarPhase {
        WarPhase::of(self.war.as_ref())
    }
}

/// Detects lifecycle transitions and score changes of a clan's war
pub struct WarDetector;

const WAR_EVENTS: &[EventType] = &[
    EventType::NewWar,
    EventType::NewWarJustStarted,
    EventType::WarBegin,
    EventType::WarEnd,
    EventType::WarClanChange,
    EventType::WarClanStarsChange,
    EventType::WarOpponentStarsChange,
    EventType::WarAttacksChange,
    EventType::PlayerAttacked,
];

/// Lifecycle event for a phase transition, if any
pub fn transition(from: WarPhase, to: WarPhase) -> Option<EventType> {
    match (from, to) {
        (WarPhase::None, WarPhase::Preparation) => Some(EventType::NewWar),
        (WarPhase::WarEnded, WarPhase::Preparation) => Some(EventType::NewWarJustStarted),
        (WarPhase::Preparation, WarPhase::InWar) => Some(EventType::WarBegin),
        (WarPhase::InWar, WarPhase::WarEnded) => Some(EventType::WarEnd),
        _ => None,
    }
}

impl ChangeDetector for WarDetector {
    type Entity = WarObservation;

    fn event_order() -> &'static [EventType] {
        WAR_EVENTS
    }

    fn changes_of(event_type: EventType, old: &WarObservation, new: &WarObservation) -> Vec<Change> {
        let Some(current) = new.war.as_ref() else {
            return Vec::new();
        };
        let (from, to) = (old.phase(), new.phase());
        let clan_change = |message: String| {
            vec![Change::new(event_type, EntityKind::Clan, &new.clan_tag, message)]
        };

        match event_type {
            EventType::NewWar
            | EventType::NewWarJustStarted
            | EventType::WarBegin
            | EventType::WarEnd => {
                if transition(from, to) == Some(event_type) {
                    clan_change(lifecycle_message(event_type, current))
                } else {
                    Vec::new()
                }
            }
            EventType::PlayerAttacked => {
                if to == WarPhase::WarEnded
                    && matches!(from, WarPhase::Preparation | WarPhase::InWar)
                {
                    attack_report(&new.clan_tag, current)
                } else {
                    Vec::new()
                }
            }
            _ => {
                // score deltas only compare two reports of an active war
                let Some(previous) = old.war.as_ref() else {
                    return Vec::new();
                };
                if from == WarPhase::None || to == WarPhase::None {
                    return Vec::new();
                }
                score_change(event_type, previous, current)
                    .map(clan_change)
                    .unwrap_or_default()
            }
        }
    }
}

fn opponent_label(war: &War) -> String {
    match war.opponent.as_ref() {
        Some(o) => format!("{} ({})", o.name, o.tag),
        None => "unknown opponent".to_string(),
    }
}

fn lifecycle_message(event_type: EventType, war: &War) -> String {
    let opponent = opponent_label(war);
    match event_type {
        EventType::NewWar => format!("Preparation started against {opponent}"),
        EventType::NewWarJustStarted => {
            format!("Next war found right after the last one, preparing against {opponent}")
        }
        EventType::WarBegin => format!("Battle day started against {opponent}"),
        _ => format!(
            "War against {opponent} ended {}-{} ({})",
            war.clan_stars(),
            war.opponent_stars(),
            war.result()
        ),
    }
}

fn score_change(event_type: EventType, old: &War, new: &War) -> Option<String> {
    let same_opponent = old.opponent_tag() == new.opponent_tag();
    match event_type {
        EventType::WarClanChange if !same_opponent => Some(format!(
            "Opponent changed from {} to {}",
            opponent_label(old),
            opponent_label(new)
        )),
        EventType::WarClanStarsChange if same_opponent && old.clan_stars() != new.clan_stars() => {
            Some(format!(
                "Clan stars changed from {} to {}",
                old.clan_stars(),
                new.clan_stars()
            ))
        }
        EventType::WarOpponentStarsChange
            if same_opponent && old.opponent_stars() != new.opponent_stars() =>
        {
            Some(format!(
                "Opponent stars changed from {} to {}",
                old.opponent_stars(),
                new.opponent_stars()
            ))
        }
        EventType::WarAttacksChange if same_opponent && old.attack_counts() != new.attack_counts() => {
            let (old_ours, old_theirs) = old.attack_counts();
            let (ours, theirs) = new.attack_counts();
            Some(format!(
                "Attacks changed from {old_ours}-{old_theirs} to {ours}-{theirs}"
            ))
        }
        _ => None,
    }
}

/// One record per attack made by the clan's members, or a note for members
/// who did not attack
fn attack_report(clan_tag: &Tag, war: &War) -> Vec<Change> {
    let Some(ours) = war.clan.as_ref() else {
        return Vec::new();
    };

    let mut members: Vec<_> = ours.members.iter().collect();
    members.sort_by_key(|m| m.map_position);

    let mut changes = Vec::new();
    for member in members {
        if member.attacks.is_empty() {
            changes.push(
                Change::new(
                    EventType::PlayerAttacked,
                    EntityKind::Player,
                    &member.tag,
                    format!("Did not attack in the war against {}", opponent_label(war)),
                )
                .with_related(clan_tag),
            );
            continue;
        }
        for attack in &member.attacks {
            changes.push(
                Change::new(
                    EventType::PlayerAttacked,
                    EntityKind::Player,
                    &member.tag,
                    format!(
                        "Attacked {} for {} stars ({:.0}%) in the war against {}",
                        attack.defender_tag,
                        attack.stars,
                        attack.destruction_percentage,
                        opponent_label(war)
                    ),
                )
                .with_related(clan_tag),
            );
        }
    }
    changes
}
