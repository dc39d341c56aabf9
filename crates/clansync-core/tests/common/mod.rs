//! Test doubles and common utilities for the sync contract tests
//!
//! The scripted source lets a test decide what `fetch()` returns and push
//! source events by hand; the orchestrator reads them from `watch()` like
//! it would from the HTTP poller.

#![allow(dead_code)]

use clansync_core::error::Result;
use clansync_core::model::{ClanMember, Role, WarClan, WarState};
use clansync_core::traits::{AuditStore, EntitySource, Snapshot, SourceEvent};
use clansync_core::{
    AuditLogRecord, Clan, EntityKind, Error, HistoryCategory, MemoryStorage, Player, Storage,
    SyncConfig, Tag, War,
};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// An EntitySource whose answers and events are set by the test
pub struct ScriptedSource {
    /// Sender for test to push events
    test_tx: mpsc::UnboundedSender<SourceEvent>,
    /// Receiver for the orchestrator's watch stream
    engine_rx: Mutex<Option<mpsc::UnboundedReceiver<SourceEvent>>>,
    /// What `fetch()` returns per kind and tag
    snapshots: Mutex<HashMap<(EntityKind, Tag), Snapshot>>,
    /// Working set as told by the orchestrator
    tracked: Mutex<HashMap<EntityKind, Vec<Tag>>>,
    polling: AtomicBool,
    maintenance: AtomicBool,
    fail_init: bool,
    fetch_call_count: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(false))
    }

    /// A source whose `init()` rejects the credentials
    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self::build(true))
    }

    fn build(fail_init: bool) -> Self {
        let (test_tx, engine_rx) = mpsc::unbounded_channel();
        Self {
            test_tx,
            engine_rx: Mutex::new(Some(engine_rx)),
            snapshots: Mutex::new(HashMap::new()),
            tracked: Mutex::new(HashMap::new()),
            polling: AtomicBool::new(false),
            maintenance: AtomicBool::new(false),
            fail_init,
            fetch_call_count: AtomicUsize::new(0),
        }
    }

    pub fn put_clan(&self, clan: Clan) {
        self.put(EntityKind::Clan, clan.tag.clone(), Snapshot::Clan(clan));
    }

    pub fn put_player(&self, player: Player) {
        self.put(EntityKind::Player, player.tag.clone(), Snapshot::Player(player));
    }

    pub fn put_war(&self, clan_tag: &Tag, war: War) {
        self.put(EntityKind::War, clan_tag.clone(), Snapshot::War(war));
    }

    fn put(&self, kind: EntityKind, tag: Tag, snapshot: Snapshot) {
        self.snapshots.lock().unwrap().insert((kind, tag), snapshot);
    }

    /// Make every `fetch()` fail with `Error::Maintenance`
    pub fn set_maintenance(&self, on: bool) {
        self.maintenance.store(on, Ordering::SeqCst);
    }

    /// Push an event onto the watch stream
    pub fn emit(&self, event: SourceEvent) {
        let _ = self.test_tx.send(event);
    }

    pub fn tracked(&self, kind: EntityKind) -> Vec<Tag> {
        self.tracked
            .lock()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::SeqCst)
    }

    pub fn fetch_call_count(&self) -> usize {
        self.fetch_call_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl EntitySource for ScriptedSource {
    async fn init(&self) -> Result<()> {
        if self.fail_init {
            return Err(Error::auth("invalid API token"));
        }
        Ok(())
    }

    async fn fetch(&self, kind: EntityKind, tag: &Tag) -> Result<Snapshot> {
        self.fetch_call_count.fetch_add(1, Ordering::SeqCst);
        if self.maintenance.load(Ordering::SeqCst) {
            return Err(Error::maintenance("scripted maintenance"));
        }
        self.snapshots
            .lock()
            .unwrap()
            .get(&(kind, tag.clone()))
            .cloned()
            .ok_or_else(|| Error::not_found(format!("{kind} {tag}")))
    }

    async fn add_tracked(&self, kind: EntityKind, tags: &[Tag]) -> Result<()> {
        let mut tracked = self.tracked.lock().unwrap();
        let set = tracked.entry(kind).or_default();
        for tag in tags {
            if !set.contains(tag) {
                set.push(tag.clone());
            }
        }
        Ok(())
    }

    async fn remove_tracked(&self, kind: EntityKind, tag: &Tag) -> Result<()> {
        if let Some(set) = self.tracked.lock().unwrap().get_mut(&kind) {
            set.retain(|t| t != tag);
        }
        Ok(())
    }

    fn set_polling(&self, enabled: bool) {
        self.polling.store(enabled, Ordering::SeqCst);
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = SourceEvent> + Send + 'static>> {
        let rx = self
            .engine_rx
            .lock()
            .unwrap()
            .take()
            .expect("watch() can only be called once");
        Box::pin(UnboundedReceiverStream::new(rx))
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// An AuditStore that answers ping but fails the next batch writes
///
/// Owner lookups and history go to the wrapped memory storage, so records
/// for unregistered owners are still dropped the usual way.
pub struct FlakyAuditStore {
    inner: Arc<MemoryStorage>,
    failures_left: AtomicUsize,
    append_calls: AtomicUsize,
}

impl FlakyAuditStore {
    /// Fail the first `failures` calls to `append_batch`
    pub fn new(inner: Arc<MemoryStorage>, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failures_left: AtomicUsize::new(failures),
            append_calls: AtomicUsize::new(0),
        })
    }

    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AuditStore for FlakyAuditStore {
    async fn ping(&self) -> bool {
        true
    }

    async fn resolve_owner(&self, kind: EntityKind, tag: &Tag) -> Result<Option<i64>> {
        self.inner.resolve_owner(kind, tag).await
    }

    async fn append_batch(&self, records: &[AuditLogRecord]) -> Result<()> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::storage("disk I/O error during batch insert"));
        }
        self.inner.append_batch(records).await
    }

    async fn history(
        &self,
        owner_id: i64,
        category: HistoryCategory,
        limit: usize,
    ) -> Result<Vec<AuditLogRecord>> {
        self.inner.history(owner_id, category, limit).await
    }
}

/// Configuration with a scripted source and default audit batching
pub fn minimal_config() -> SyncConfig {
    let mut config = SyncConfig::new();
    config.source = clansync_core::SourceConfig::Custom {
        factory: "scripted".to_string(),
        config: serde_json::json!({}),
    };
    config
}

/// Shared in-memory storage and the trait-object view of it
pub fn memory_storage() -> (Arc<MemoryStorage>, Storage) {
    let backend = Arc::new(MemoryStorage::new());
    let storage = Storage::from_backend(Arc::clone(&backend));
    (backend, storage)
}

pub fn tag(raw: &str) -> Tag {
    Tag::parse(raw).unwrap()
}

pub fn member(raw_tag: &str, name: &str, role: Role) -> ClanMember {
    ClanMember {
        tag: tag(raw_tag),
        name: name.to_string(),
        role: Some(role),
        town_hall_level: 12,
        extra: Default::default(),
    }
}

pub fn clan(raw_tag: &str, name: &str, members: Vec<ClanMember>) -> Clan {
    let mut clan = Clan::new(tag(raw_tag), name);
    clan.level = 10;
    clan.member_count = members.len() as u32;
    clan.members = members;
    clan
}

pub fn player(raw_tag: &str, name: &str, town_hall_level: u32) -> Player {
    Player::new(tag(raw_tag), name, town_hall_level)
}

pub fn war_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// War of `clan_tag` against `opponent_tag` in `state` with the given stars
pub fn war(state: WarState, clan_tag: &str, opponent_tag: &str, stars: (u32, u32)) -> War {
    let mut home = WarClan::new(tag(clan_tag), "Home");
    home.stars = stars.0;
    let mut away = WarClan::new(tag(opponent_tag), "Rival");
    away.stars = stars.1;

    War {
        state,
        team_size: 5,
        preparation_start_time: Some(war_start() - chrono::Duration::hours(23)),
        start_time: Some(war_start()),
        end_time: Some(war_start() + chrono::Duration::hours(24)),
        clan: Some(home),
        opponent: Some(away),
        ..War::not_in_war()
    }
}

/// Let spawned tasks run
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
