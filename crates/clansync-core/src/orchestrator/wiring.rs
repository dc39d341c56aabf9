//! Dispatcher registrations
//!
//! Every event type a detector knows is registered with a filter asking the
//! detector whether that type fired, and a handler that turns the detected
//! changes into audit records.

use chrono::Utc;
use std::sync::Arc;

use super::context::SyncContext;
use crate::audit::AuditSink;
use crate::detector::ChangeDetector;
use crate::dispatch::EventDispatcher;
use crate::model::{Change, ChangeEvent, EventType, Tag};

/// Build the dispatcher for one detector
///
/// With `cascade` set, players seen joining a clan or attacking in its war
/// are queued for registration on `context`.
pub(crate) fn dispatcher_for<D>(
    audit: &AuditSink,
    context: &Arc<SyncContext>,
    cascade: bool,
) -> EventDispatcher<D::Entity>
where
    D: ChangeDetector + 'static,
{
    let mut dispatcher = EventDispatcher::new();

    for &event_type in D::event_order() {
        let audit = audit.clone();
        let context = Arc::clone(context);

        dispatcher.register(
            event_type,
            move |old, new| D::has_change(event_type, old, new),
            move |old, new| {
                let changes = D::changes_of(event_type, old, new);
                let raw = Arc::new(serde_json::to_value(new)?);
                let observed_at = Utc::now();

                for change in changes {
                    if cascade {
                        if let Some(tag) = cascade_target(&change) {
                            context.queue_registration(tag);
                        }
                    }
                    audit.record_change(&ChangeEvent::new(change, observed_at, Arc::clone(&raw)));
                }
                Ok(())
            },
        );
    }

    dispatcher
}

fn cascade_target(change: &Change) -> Option<Tag> {
    match change.event_type {
        EventType::MemberJoined => change.related_tag.clone(),
        EventType::PlayerAttacked => Some(change.subject_tag.clone()),
        _ => None,
    }
}
