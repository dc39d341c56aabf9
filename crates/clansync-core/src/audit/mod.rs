//! Batched audit logging
//!
//! [`AuditSink`] buffers change records in memory, one queue per owner kind,
//! and writes them to an [`AuditStore`] in batches. A flush is triggered by:
//!
//! 1. A queue reaching `batch_size` records (immediate)
//! 2. The flush timer, armed by the first record after a flush (`flush_interval`)
//! 3. An explicit [`AuditSink::flush_now`] or [`AuditSink::close`]
//!
//! Records only leave a queue once they were written, or once their owner
//! turned out not to be registered. A failed flush keeps everything else
//! queued for the next attempt.

mod timer;

pub use timer::FlushTimer;

use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::AuditConfig;
use crate::model::{AuditLogRecord, ChangeEvent, EntityKind, EventType, Tag};
use crate::traits::AuditStore;
use crate::{Error, Result};

/// Record waiting to be flushed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAudit {
    seq: u64,
    pub owner_kind: EntityKind,
    pub owner_tag: Tag,
    pub event_type: EventType,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Result of a successful flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Records written to storage
    pub written: usize,
    /// Records discarded because their owner is not registered
    pub dropped: usize,
}

#[derive(Debug, Default)]
struct Queues {
    clans: VecDeque<PendingAudit>,
    players: VecDeque<PendingAudit>,
    next_seq: u64,
}

impl Queues {
    fn queue_mut(&mut self, kind: EntityKind) -> &mut VecDeque<PendingAudit> {
        match kind {
            EntityKind::Player => &mut self.players,
            EntityKind::Clan | EntityKind::War => &mut self.clans,
        }
    }

    fn len(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Player => self.players.len(),
            EntityKind::Clan | EntityKind::War => self.clans.len(),
        }
    }

    fn total(&self) -> usize {
        self.clans.len() + self.players.len()
    }

    /// Every pending record in enqueue order
    fn snapshot(&self) -> Vec<PendingAudit> {
        let mut all: Vec<_> = self.clans.iter().chain(self.players.iter()).cloned().collect();
        all.sort_by_key(|p| p.seq);
        all
    }

    fn remove(&mut self, seqs: &HashSet<u64>) {
        if seqs.is_empty() {
            return;
        }
        self.clans.retain(|p| !seqs.contains(&p.seq));
        self.players.retain(|p| !seqs.contains(&p.seq));
    }
}

#[derive(Debug, Default)]
struct Holds {
    count: usize,
    flush_requested: bool,
}

struct SinkInner {
    store: Arc<dyn AuditStore>,
    batch_size: usize,
    flush_interval: Duration,
    queues: Mutex<Queues>,
    holds: Mutex<Holds>,
    timer: FlushTimer,
    flush_lock: tokio::sync::Mutex<()>,
}

/// Batching writer in front of an [`AuditStore`]
///
/// Cheap to clone; clones share the same queues and timer.
#[derive(Clone)]
pub struct AuditSink {
    inner: Arc<SinkInner>,
}

/// Defers automatic flushes while alive
///
/// Flushes requested by the batch size or the timer while a hold is active
/// run as soon as the last hold is dropped. Explicit flushes are not
/// affected.
#[must_use = "automatic flushes resume as soon as the hold is dropped"]
pub struct FlushHold {
    inner: Arc<SinkInner>,
}

impl AuditSink {
    /// Create a sink writing to `store`
    pub fn new(store: Arc<dyn AuditStore>, config: &AuditConfig) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                store,
                batch_size: config.batch_size.max(1),
                flush_interval: config.flush_interval(),
                queues: Mutex::new(Queues::default()),
                holds: Mutex::new(Holds::default()),
                timer: FlushTimer::new(),
                flush_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Queue a record
    ///
    /// Records about wars are filed under the owning clan.
    pub fn record(
        &self,
        owner_tag: &Tag,
        message: impl Into<String>,
        event_type: EventType,
        kind: EntityKind,
    ) {
        self.enqueue(owner_tag, message.into(), event_type, kind, Utc::now());
    }

    /// Queue the record for a dispatched change
    pub fn record_change(&self, event: &ChangeEvent) {
        self.enqueue(
            &event.subject_tag,
            event.message.clone(),
            event.event_type,
            event.subject_kind,
            event.occurred_at,
        );
    }

    /// Records waiting in the queue of one owner kind
    pub fn pending(&self, kind: EntityKind) -> usize {
        lock(&self.inner.queues).len(kind.audit_owner())
    }

    /// Records waiting in all queues
    pub fn pending_total(&self) -> usize {
        lock(&self.inner.queues).total()
    }

    /// Pending records in enqueue order
    pub fn pending_records(&self) -> Vec<PendingAudit> {
        lock(&self.inner.queues).snapshot()
    }

    /// Whether the flush timer is armed
    pub fn timer_armed(&self) -> bool {
        self.inner.timer.is_armed()
    }

    /// Defer automatic flushes until the returned guard is dropped
    pub fn hold(&self) -> FlushHold {
        lock(&self.inner.holds).count += 1;
        FlushHold {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Flush everything queued right now
    ///
    /// # Returns
    ///
    /// - `Ok(FlushOutcome)`: Batch written (or nothing to write)
    /// - `Err(Error::StorageUnavailable)`: Storage did not answer; queue untouched
    /// - `Err(Error)`: Batch write failed; unwritten records stay queued
    pub async fn flush_now(&self) -> Result<FlushOutcome> {
        self.inner.flush().await
    }

    /// Final flush bounded by `timeout`, then disarm the timer
    pub async fn close(&self, timeout: Duration) -> Result<FlushOutcome> {
        let result = match tokio::time::timeout(timeout, self.inner.flush()).await {
            Ok(result) => result,
            Err(_) => Err(Error::storage(format!(
                "final audit flush did not finish within {:?}",
                timeout
            ))),
        };
        self.inner.timer.cancel();

        let left = self.pending_records();
        if !left.is_empty() {
            warn!("{} audit record(s) were not written before shutdown", left.len());
            for entry in &left {
                warn!(
                    "Unwritten {} record for {} {}: {}",
                    entry.event_type, entry.owner_kind, entry.owner_tag, entry.message
                );
            }
        }
        result
    }

    fn enqueue(
        &self,
        owner_tag: &Tag,
        message: String,
        event_type: EventType,
        kind: EntityKind,
        occurred_at: DateTime<Utc>,
    ) {
        let owner_kind = kind.audit_owner();
        let queued = {
            let mut queues = lock(&self.inner.queues);
            let seq = queues.next_seq;
            queues.next_seq += 1;
            let queue = queues.queue_mut(owner_kind);
            queue.push_back(PendingAudit {
                seq,
                owner_kind,
                owner_tag: owner_tag.clone(),
                event_type,
                message,
                occurred_at,
            });
            queue.len()
        };
        debug!("Queued {} for {} {} ({} pending)", event_type, owner_kind, owner_tag, queued);

        if queued >= self.inner.batch_size {
            self.inner.request_flush();
        } else {
            self.inner.arm_timer();
        }
    }
}

impl SinkInner {
    fn request_flush(self: &Arc<Self>) {
        {
            let mut holds = lock(&self.holds);
            if holds.count > 0 {
                holds.flush_requested = true;
                return;
            }
        }
        self.spawn_flush();
    }

    fn spawn_flush(self: &Arc<Self>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available, audit flush deferred");
            return;
        };
        let inner = Arc::clone(self);
        runtime.spawn(async move {
            if let Err(e) = inner.flush().await {
                warn!("Audit flush failed: {}", e);
            }
        });
    }

    fn arm_timer(self: &Arc<Self>) {
        if tokio::runtime::Handle::try_current().is_err() {
            return;
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        let armed = self.timer.start(self.flush_interval, move || {
            if let Some(inner) = weak.upgrade() {
                inner.request_flush();
            }
        });
        if armed {
            debug!("Audit flush timer armed for {:?}", self.flush_interval);
        }
    }

    async fn flush(self: &Arc<Self>) -> Result<FlushOutcome> {
        let _guard = self.flush_lock.lock().await;
        self.timer.cancel();

        let result = self.write_pending().await;

        if lock(&self.queues).total() > 0 {
            self.arm_timer();
        }
        result
    }

    async fn write_pending(&self) -> Result<FlushOutcome> {
        let batch = lock(&self.queues).snapshot();
        if batch.is_empty() {
            return Ok(FlushOutcome::default());
        }

        if !self.store.ping().await {
            error!(
                "Audit store unreachable, keeping {} record(s) queued",
                batch.len()
            );
            return Err(Error::storage_unavailable("audit store did not answer ping"));
        }

        let mut records = Vec::with_capacity(batch.len());
        let mut resolved = HashSet::new();
        let mut dropped = HashSet::new();

        for entry in &batch {
            match self.store.resolve_owner(entry.owner_kind, &entry.owner_tag).await {
                Ok(Some(owner_id)) => {
                    records.push(AuditLogRecord {
                        id: None,
                        owner_id,
                        owner_kind: entry.owner_kind,
                        event_type: entry.event_type,
                        detail: entry.message.clone(),
                        added_on: entry.occurred_at,
                    });
                    resolved.insert(entry.seq);
                }
                Ok(None) => {
                    warn!(
                        "Dropping {} record for unregistered {} {}: {}",
                        entry.event_type, entry.owner_kind, entry.owner_tag, entry.message
                    );
                    dropped.insert(entry.seq);
                }
                Err(e) => {
                    lock(&self.queues).remove(&dropped);
                    return Err(e);
                }
            }
        }

        lock(&self.queues).remove(&dropped);

        if !records.is_empty() {
            if let Err(e) = self.store.append_batch(&records).await {
                error!(
                    "Audit batch of {} record(s) failed, keeping them queued: {}",
                    records.len(),
                    e
                );
                return Err(e);
            }
            lock(&self.queues).remove(&resolved);
        }

        info!(
            "Flushed {} audit record(s), dropped {}",
            records.len(),
            dropped.len()
        );
        Ok(FlushOutcome {
            written: records.len(),
            dropped: dropped.len(),
        })
    }
}

impl Drop for FlushHold {
    fn drop(&mut self) {
        let requested = {
            let mut holds = lock(&self.inner.holds);
            holds.count = holds.count.saturating_sub(1);
            holds.count == 0 && std::mem::take(&mut holds.flush_requested)
        };
        if requested {
            self.inner.spawn_flush();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStorage;
    use crate::traits::EntityRegistry;

    fn config(batch_size: usize) -> AuditConfig {
        AuditConfig {
            batch_size,
            flush_interval_secs: 60,
            shutdown_flush_timeout_secs: 5,
        }
    }

    async fn storage_with_clan(tag: &Tag) -> Arc<MemoryStorage> {
        let storage = Arc::new(MemoryStorage::new());
        storage.register(EntityKind::Clan, tag, true).await.unwrap();
        storage
    }

    #[tokio::test]
    async fn flush_writes_in_enqueue_order() {
        let tag = Tag::parse("#C1").unwrap();
        let storage = storage_with_clan(&tag).await;
        let sink = AuditSink::new(storage.clone(), &config(10));

        sink.record(&tag, "first", EventType::ClanNameChanged, EntityKind::Clan);
        sink.record(&tag, "second", EventType::WarBegin, EntityKind::War);

        let outcome = sink.flush_now().await.unwrap();
        assert_eq!(outcome, FlushOutcome { written: 2, dropped: 0 });
        assert_eq!(sink.pending_total(), 0);

        let written = storage.audit_records().await;
        let details: Vec<_> = written.iter().map(|r| r.detail.as_str()).collect();
        assert_eq!(details, vec!["first", "second"]);
        assert!(written.iter().all(|r| r.owner_kind == EntityKind::Clan));
    }

    #[tokio::test]
    async fn unregistered_owners_are_dropped() {
        let known = Tag::parse("#C1").unwrap();
        let unknown = Tag::parse("#C2").unwrap();
        let storage = storage_with_clan(&known).await;
        let sink = AuditSink::new(storage.clone(), &config(10));

        sink.record(&known, "kept", EventType::ClanLevelChanged, EntityKind::Clan);
        sink.record(&unknown, "lost", EventType::ClanLevelChanged, EntityKind::Clan);

        let outcome = sink.flush_now().await.unwrap();
        assert_eq!(outcome, FlushOutcome { written: 1, dropped: 1 });
        assert_eq!(sink.pending_total(), 0);
        assert_eq!(storage.audit_records().await.len(), 1);
    }

    #[tokio::test]
    async fn unreachable_store_keeps_queue() {
        let tag = Tag::parse("#C1").unwrap();
        let storage = storage_with_clan(&tag).await;
        let sink = AuditSink::new(storage.clone(), &config(10));
        storage.set_available(false);

        sink.record(&tag, "pending", EventType::ClanNameChanged, EntityKind::Clan);
        let err = sink.flush_now().await.unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable(_)));
        assert_eq!(sink.pending(EntityKind::Clan), 1);
        assert!(sink.timer_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn hold_defers_batch_flush() {
        let tag = Tag::parse("#C1").unwrap();
        let storage = storage_with_clan(&tag).await;
        let sink = AuditSink::new(storage.clone(), &config(2));

        let hold = sink.hold();
        sink.record(&tag, "a", EventType::ClanNameChanged, EntityKind::Clan);
        sink.record(&tag, "b", EventType::ClanNameChanged, EntityKind::Clan);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.pending_total(), 2);

        drop(hold);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.pending_total(), 0);
        assert_eq!(storage.audit_records().await.len(), 2);
    }

    #[tokio::test]
    async fn empty_flush_is_a_no_op() {
        let storage = Arc::new(MemoryStorage::new());
        let sink = AuditSink::new(storage, &config(10));
        assert_eq!(sink.flush_now().await.unwrap(), FlushOutcome::default());
        assert!(!sink.timer_armed());
    }
}
