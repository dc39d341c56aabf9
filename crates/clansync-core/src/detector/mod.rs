//! Change detection
//!
//! A detector compares two snapshots of the same entity and describes what
//! changed. Detectors are pure: the same pair always yields the same ordered
//! list of [`Change`]s, and a snapshot compared with itself yields nothing.
//!
//! Every detector exposes its event types in a fixed order. Both
//! [`ChangeDetector::diff`] and the dispatcher wiring walk that order, so
//! audit records for one observation are always produced in the same
//! sequence.

mod clan;
mod player;
mod war;

pub use clan::ClanDetector;
pub use player::PlayerDetector;
pub use war::{WarDetector, WarObservation};

use serde::Serialize;

use crate::model::{Change, EventType};

/// Pure comparison of two entity snapshots
pub trait ChangeDetector {
    /// Entity being compared
    type Entity: Serialize + Send + Sync + 'static;

    /// Event types this detector can produce, in emission order
    fn event_order() -> &'static [EventType];

    /// Changes of a single event type between two snapshots
    ///
    /// Returns an empty list for event types outside [`Self::event_order`].
    fn changes_of(event_type: EventType, old: &Self::Entity, new: &Self::Entity) -> Vec<Change>;

    /// Whether the pair contains at least one change of the given type
    fn has_change(event_type: EventType, old: &Self::Entity, new: &Self::Entity) -> bool {
        !Self::changes_of(event_type, old, new).is_empty()
    }

    /// All changes between two snapshots, in emission order
    fn diff(old: &Self::Entity, new: &Self::Entity) -> Vec<Change> {
        Self::event_order()
            .iter()
            .flat_map(|event_type| Self::changes_of(*event_type, old, new))
            .collect()
    }
}

/// Render an optional value for a change message
pub(crate) fn or_none(value: Option<&str>) -> &str {
    value.unwrap_or("none")
}
