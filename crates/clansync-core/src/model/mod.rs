//! Domain model: entities, tags, change events and persistent records

mod entity;
mod event;
mod record;
mod tag;
pub mod war;

pub use entity::{Clan, ClanMember, Location, Player, PlayerClan, Role};
pub use event::{Change, ChangeEvent, EntityKind, EventType, HistoryCategory};
pub use record::{
    AuditLogRecord, EntitySnapshot, Registration, TrackedEntity, WarKey, WarLogRecord, WarUpsert,
};
pub use tag::{Tag, TAG_ALPHABET};
pub use war::{Attack, Label, War, WarClan, WarMember, WarPhase, WarResult, WarState};
