use std::collections::HashMap;

use super::{or_none, ChangeDetector};
use crate::model::{Change, Clan, ClanMember, EntityKind, EventType, Tag};

/// Detects profile and membership changes of a clan
pub struct ClanDetector;

const CLAN_EVENTS: &[EventType] = &[
    EventType::ClanNameChanged,
    EventType::ClanDescriptionChanged,
    EventType::ClanLevelChanged,
    EventType::ClanWarLogVisibilityChanged,
    EventType::ClanLocationChanged,
    EventType::ClanReformed,
    EventType::ClanDisbanded,
    EventType::MemberLeft,
    EventType::MemberRoleChanged,
    EventType::MemberTownHallChanged,
    EventType::MemberJoined,
];

impl ChangeDetector for ClanDetector {
    type Entity = Clan;

    fn event_order() -> &'static [EventType] {
        CLAN_EVENTS
    }

    fn changes_of(event_type: EventType, old: &Clan, new: &Clan) -> Vec<Change> {
        let tag = &new.tag;
        let profile = |message: String| vec![Change::new(event_type, EntityKind::Clan, tag, message)];

        match event_type {
            EventType::ClanNameChanged if old.name != new.name => {
                profile(format!("Name changed from {} to {}", old.name, new.name))
            }
            EventType::ClanDescriptionChanged if old.description != new.description => profile(
                format!("Description changed from {} to {}", old.description, new.description),
            ),
            EventType::ClanLevelChanged if old.level != new.level => {
                profile(format!("Level changed from {} to {}", old.level, new.level))
            }
            EventType::ClanWarLogVisibilityChanged
                if old.is_war_log_public != new.is_war_log_public =>
            {
                profile(format!(
                    "War log visibility changed from {} to {}",
                    visibility(old.is_war_log_public),
                    visibility(new.is_war_log_public)
                ))
            }
            EventType::ClanLocationChanged if old.location_name() != new.location_name() => {
                profile(format!(
                    "Location changed from {} to {}",
                    or_none(old.location_name()),
                    or_none(new.location_name())
                ))
            }
            EventType::ClanReformed if old.member_count == 0 && new.member_count > 0 => {
                profile(format!("Clan reformed with {} members", new.member_count))
            }
            EventType::ClanDisbanded if old.member_count > 0 && new.member_count == 0 => {
                profile("Clan disbanded".to_string())
            }
            EventType::MemberLeft => departures(old, new),
            EventType::MemberJoined => arrivals(old, new),
            EventType::MemberRoleChanged => promotions(old, new),
            EventType::MemberTownHallChanged => upgrades(old, new),
            _ => Vec::new(),
        }
    }
}

fn visibility(public: bool) -> &'static str {
    if public { "public" } else { "private" }
}

fn by_tag(clan: &Clan) -> HashMap<&Tag, &ClanMember> {
    clan.members.iter().map(|m| (&m.tag, m)).collect()
}

fn member_change(event_type: EventType, clan: &Clan, member: &ClanMember, what: String) -> Change {
    Change::new(
        event_type,
        EntityKind::Clan,
        &clan.tag,
        format!("{} ({}) {}", member.name, member.tag, what),
    )
    .with_related(&member.tag)
}

/// Members gone from the new list, or still listed with their role cleared
fn departures(old: &Clan, new: &Clan) -> Vec<Change> {
    let current = by_tag(new);
    old.members
        .iter()
        .filter(|then| match current.get(&then.tag) {
            None => true,
            Some(now) => then.role.is_some() && now.role.is_none(),
        })
        .map(|m| member_change(EventType::MemberLeft, new, m, "left the clan".into()))
        .collect()
}

/// Members absent from the old list
fn arrivals(old: &Clan, new: &Clan) -> Vec<Change> {
    let previous = by_tag(old);
    new.members
        .iter()
        .filter(|m| !previous.contains_key(&m.tag))
        .map(|m| member_change(EventType::MemberJoined, new, m, "joined the clan".into()))
        .collect()
}

fn promotions(old: &Clan, new: &Clan) -> Vec<Change> {
    let current = by_tag(new);
    old.members
        .iter()
        .filter_map(|then| {
            let now = current.get(&then.tag)?;
            match (then.role, now.role) {
                (Some(from), Some(to)) if from != to => Some(member_change(
                    EventType::MemberRoleChanged,
                    new,
                    now,
                    format!("role changed from {from} to {to}"),
                )),
                _ => None,
            }
        })
        .collect()
}

fn upgrades(old: &Clan, new: &Clan) -> Vec<Change> {
    let current = by_tag(new);
    old.members
        .iter()
        .filter_map(|then| {
            let now = current.get(&then.tag)?;
            (then.town_hall_level != now.town_hall_level).then(|| {
                member_change(
                    EventType::MemberTownHallChanged,
                    new,
                    now,
                    format!(
                        "town hall level changed from {} to {}",
                        then.town_hall_level, now.town_hall_level
                    ),
                )
            })
        })
        .collect()
}
