//! Mutable state shared by the orchestrator and its dispatcher handlers

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::model::{EntityKind, Tag};

/// Lifecycle phase of the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    Uninitialized,
    RegisteringBaseline,
    Polling,
    Discovering,
    Maintenance,
    Stopped,
}

/// Working sets and bookkeeping for one orchestrator
#[derive(Debug)]
pub struct SyncContext {
    phase: Mutex<SyncPhase>,
    tracked: Mutex<HashMap<EntityKind, BTreeSet<Tag>>>,
    dropped: Mutex<HashSet<(EntityKind, Tag)>>,
    pending_registrations: Mutex<Vec<Tag>>,
}

impl SyncContext {
    pub fn new() -> Self {
        Self {
            phase: Mutex::new(SyncPhase::Uninitialized),
            tracked: Mutex::new(HashMap::new()),
            dropped: Mutex::new(HashSet::new()),
            pending_registrations: Mutex::new(Vec::new()),
        }
    }

    pub fn phase(&self) -> SyncPhase {
        *lock(&self.phase)
    }

    pub fn set_phase(&self, phase: SyncPhase) {
        *lock(&self.phase) = phase;
    }

    /// Tags currently in the polling working set
    pub fn tracked(&self, kind: EntityKind) -> Vec<Tag> {
        lock(&self.tracked)
            .get(&kind)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_tracked(&self, kind: EntityKind, tag: &Tag) -> bool {
        lock(&self.tracked)
            .get(&kind)
            .is_some_and(|set| set.contains(tag))
    }

    /// Tags from `candidates` that are neither tracked nor dropped
    pub fn untracked(&self, kind: EntityKind, candidates: &[Tag]) -> Vec<Tag> {
        let tracked = lock(&self.tracked);
        let dropped = lock(&self.dropped);
        let set = tracked.get(&kind);
        candidates
            .iter()
            .filter(|tag| !set.is_some_and(|s| s.contains(*tag)))
            .filter(|tag| !dropped.contains(&(kind, (*tag).clone())))
            .cloned()
            .collect()
    }

    /// Add tags to the working set, returning the ones that were new
    pub fn track(&self, kind: EntityKind, tags: &[Tag]) -> Vec<Tag> {
        let mut tracked = lock(&self.tracked);
        let set = tracked.entry(kind).or_default();
        tags.iter().filter(|t| set.insert((*t).clone())).cloned().collect()
    }

    pub fn untrack(&self, kind: EntityKind, tag: &Tag) -> bool {
        lock(&self.tracked)
            .get_mut(&kind)
            .is_some_and(|set| set.remove(tag))
    }

    /// Stop considering a tag during discovery
    pub fn mark_dropped(&self, kind: EntityKind, tag: &Tag) {
        lock(&self.dropped).insert((kind, tag.clone()));
    }

    pub fn clear_dropped(&self, kind: EntityKind, tag: &Tag) {
        lock(&self.dropped).remove(&(kind, tag.clone()));
    }

    /// Queue a player for registration after the current dispatch
    pub fn queue_registration(&self, tag: Tag) {
        let mut pending = lock(&self.pending_registrations);
        if !pending.contains(&tag) {
            pending.push(tag);
        }
    }

    pub fn take_registrations(&self) -> Vec<Tag> {
        std::mem::take(&mut *lock(&self.pending_registrations))
    }
}

impl Default for SyncContext {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(raw: &str) -> Tag {
        Tag::parse(raw).unwrap()
    }

    #[test]
    fn track_reports_only_new_tags() {
        let context = SyncContext::new();
        assert_eq!(context.track(EntityKind::Clan, &[tag("#C1")]), vec![tag("#C1")]);
        assert_eq!(
            context.track(EntityKind::Clan, &[tag("#C1"), tag("#C2")]),
            vec![tag("#C2")]
        );
        assert!(context.is_tracked(EntityKind::Clan, &tag("#C2")));
        assert!(!context.is_tracked(EntityKind::Player, &tag("#C2")));
    }

    #[test]
    fn dropped_tags_are_not_rediscovered() {
        let context = SyncContext::new();
        context.mark_dropped(EntityKind::Clan, &tag("#C9"));
        let fresh = context.untracked(EntityKind::Clan, &[tag("#C9"), tag("#C3")]);
        assert_eq!(fresh, vec![tag("#C3")]);

        context.clear_dropped(EntityKind::Clan, &tag("#C9"));
        assert_eq!(context.untracked(EntityKind::Clan, &[tag("#C9")]), vec![tag("#C9")]);
    }

    #[test]
    fn registrations_are_deduplicated() {
        let context = SyncContext::new();
        context.queue_registration(tag("#P1"));
        context.queue_registration(tag("#P1"));
        context.queue_registration(tag("#P2"));
        assert_eq!(context.take_registrations(), vec![tag("#P1"), tag("#P2")]);
        assert!(context.take_registrations().is_empty());
    }
}
