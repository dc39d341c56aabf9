//! Event dispatcher
//!
//! Maps event types to a filter predicate and an ordered list of handlers.
//! On every `(old, new)` pair the dispatcher walks its registrations in the
//! order they were made; for each registration whose filter matches, every
//! handler runs in the order it was added.
//!
//! A handler that returns an error or panics is logged and skipped. It never
//! prevents the remaining handlers, or the remaining event types, from
//! running.

use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error};

use crate::model::EventType;
use crate::Result;

/// Predicate deciding whether an event type fired between two snapshots
pub type Filter<T> = Box<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Side-effecting reaction to an event type
pub type Handler<T> = Box<dyn Fn(&T, &T) -> Result<()> + Send + Sync>;

struct Registration<T> {
    event_type: EventType,
    filter: Filter<T>,
    handlers: Vec<Handler<T>>,
}

/// Summary of one dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Event types whose filter matched, in dispatch order
    pub matched: Vec<EventType>,
    /// Handlers that returned an error or panicked
    pub failed_handlers: usize,
}

impl DispatchReport {
    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }
}

/// Ordered event type → handlers registry for one entity type
pub struct EventDispatcher<T> {
    registrations: Vec<Registration<T>>,
}

impl<T> EventDispatcher<T> {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }

    /// Register an event type with its filter
    ///
    /// Registering the same event type again replaces the filter but keeps
    /// its position and handlers.
    pub fn set_event<F>(&mut self, event_type: EventType, filter: F)
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        match self.position(event_type) {
            Some(index) => self.registrations[index].filter = Box::new(filter),
            None => self.registrations.push(Registration {
                event_type,
                filter: Box::new(filter),
                handlers: Vec::new(),
            }),
        }
    }

    /// Append a handler to a registered event type
    pub fn on<H>(&mut self, event_type: EventType, handler: H) -> Result<()>
    where
        H: Fn(&T, &T) -> Result<()> + Send + Sync + 'static,
    {
        let index = self.position(event_type).ok_or_else(|| {
            crate::Error::config(format!("event type {event_type} is not registered"))
        })?;
        self.registrations[index].handlers.push(Box::new(handler));
        Ok(())
    }

    /// Register an event type with a filter and its first handler
    pub fn register<F, H>(&mut self, event_type: EventType, filter: F, handler: H)
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
        H: Fn(&T, &T) -> Result<()> + Send + Sync + 'static,
    {
        self.set_event(event_type, filter);
        if let Some(index) = self.position(event_type) {
            self.registrations[index].handlers.push(Box::new(handler));
        }
    }

    /// Registered event types in dispatch order
    pub fn event_types(&self) -> Vec<EventType> {
        self.registrations.iter().map(|r| r.event_type).collect()
    }

    /// Run every matching handler for the pair
    pub fn dispatch(&self, old: &T, new: &T) -> DispatchReport {
        let mut report = DispatchReport::default();

        for registration in &self.registrations {
            let event_type = registration.event_type;
            let matched = match catch_unwind(AssertUnwindSafe(|| (registration.filter)(old, new))) {
                Ok(matched) => matched,
                Err(_) => {
                    error!("Filter for {} panicked, skipping", event_type);
                    false
                }
            };
            if !matched {
                continue;
            }

            debug!("Dispatching {} to {} handler(s)", event_type, registration.handlers.len());
            report.matched.push(event_type);

            for (index, handler) in registration.handlers.iter().enumerate() {
                match catch_unwind(AssertUnwindSafe(|| handler(old, new))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        error!("Handler #{} for {} failed: {}", index, event_type, e);
                        report.failed_handlers += 1;
                    }
                    Err(_) => {
                        error!("Handler #{} for {} panicked", index, event_type);
                        report.failed_handlers += 1;
                    }
                }
            }
        }

        report
    }

    fn position(&self, event_type: EventType) -> Option<usize> {
        self.registrations
            .iter()
            .position(|r| r.event_type == event_type)
    }
}

impl<T> Default for EventDispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(log: &Log, label: &'static str) -> impl Fn(&u32, &u32) -> Result<()> + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |_, _| {
            log.lock().unwrap().push(label.to_string());
            Ok(())
        }
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let log: Log = Arc::default();
        let mut dispatcher = EventDispatcher::<u32>::new();
        dispatcher.register(EventType::ClanNameChanged, |a, b| a != b, recorder(&log, "name-1"));
        dispatcher.register(EventType::MemberJoined, |a, b| b > a, recorder(&log, "joined"));
        dispatcher.on(EventType::ClanNameChanged, recorder(&log, "name-2")).unwrap();

        let report = dispatcher.dispatch(&1, &2);
        assert_eq!(report.matched, vec![EventType::ClanNameChanged, EventType::MemberJoined]);
        assert_eq!(*log.lock().unwrap(), vec!["name-1", "name-2", "joined"]);
    }

    #[test]
    fn failing_handler_does_not_stop_others() {
        let log: Log = Arc::default();
        let mut dispatcher = EventDispatcher::<u32>::new();
        dispatcher.register(EventType::ClanNameChanged, |_, _| true, |_, _| {
            Err(crate::Error::handler("clan_name_changed", "boom"))
        });
        dispatcher.on(EventType::ClanNameChanged, |_, _| panic!("handler bug")).unwrap();
        dispatcher.on(EventType::ClanNameChanged, recorder(&log, "after")).unwrap();
        dispatcher.register(EventType::MemberLeft, |_, _| true, recorder(&log, "left"));

        let report = dispatcher.dispatch(&0, &0);
        assert_eq!(report.failed_handlers, 2);
        assert_eq!(*log.lock().unwrap(), vec!["after", "left"]);
    }

    #[test]
    fn unmatched_filters_skip_handlers() {
        let log: Log = Arc::default();
        let mut dispatcher = EventDispatcher::<u32>::new();
        dispatcher.register(EventType::ClanLevelChanged, |a, b| a != b, recorder(&log, "level"));

        assert!(dispatcher.dispatch(&3, &3).is_empty());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn handler_for_unknown_event_is_rejected() {
        let mut dispatcher = EventDispatcher::<u32>::new();
        assert!(dispatcher.on(EventType::WarEnd, |_, _| Ok(())).is_err());
    }

    #[test]
    fn re_registering_keeps_position() {
        let mut dispatcher = EventDispatcher::<u32>::new();
        dispatcher.set_event(EventType::ClanNameChanged, |_, _| false);
        dispatcher.set_event(EventType::MemberLeft, |_, _| true);
        dispatcher.set_event(EventType::ClanNameChanged, |_, _| true);

        assert_eq!(
            dispatcher.event_types(),
            vec![EventType::ClanNameChanged, EventType::MemberLeft]
        );
        assert_eq!(dispatcher.dispatch(&0, &0).matched.len(), 2);
    }
}
