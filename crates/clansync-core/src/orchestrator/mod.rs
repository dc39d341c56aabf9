//! Sync orchestrator
//!
//! The SyncOrchestrator is responsible for:
//! - Taking a baseline snapshot of every tracked entity before polling it
//! - Feeding observed changes through the per-kind event dispatchers
//! - Persisting snapshots and war log rows after each handled change
//! - Discovering newly tracked entities on a fixed interval
//! - Flushing the audit queue one last time on shutdown
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ EntitySource │─── SourceEvent ───┐
//! └──────────────┘                   │
//!                                    ▼
//!                         ┌──────────────────┐
//!                         │ SyncOrchestrator │
//!                         └──────────────────┘
//!                                    │
//!         ┌──────────────────────────┼──────────────────────────┐
//!         │                          │                          │
//!         ▼                          ▼                          ▼
//! ┌───────────────┐         ┌────────────────┐         ┌───────────────┐
//! │ Dispatchers   │         │ Storage        │         │ Events        │
//! │ (→ AuditSink) │         │ (snapshots,    │         │ (monitoring)  │
//! └───────────────┘         │  war log)      │         └───────────────┘
//!                           └────────────────┘
//! ```
//!
//! ## Event Flow
//!
//! 1. Source reports an `(old, new)` pair for a tracked entity
//! 2. The dispatcher for that kind runs every matching handler, in order
//! 3. Handlers queue audit records and players to register
//! 4. Queued players are registered, then automatic flushes may run again
//! 5. The new snapshot (and war log row) is persisted
//! 6. Event emitted for monitoring/logging
//!
//! Source events are handled one at a time, so changes of the same entity
//! are processed in the order they were observed.

mod context;
mod wiring;

pub use context::{SyncContext, SyncPhase};

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditSink, FlushOutcome};
use crate::config::SyncConfig;
use crate::detector::{ClanDetector, PlayerDetector, WarDetector, WarObservation};
use crate::dispatch::{DispatchReport, EventDispatcher};
use crate::error::{Error, Result};
use crate::model::{
    AuditLogRecord, Clan, EntityKind, EventType, HistoryCategory, Player, Registration, Tag, War,
    WarLogRecord, WarPhase, WarUpsert,
};
use crate::traits::{EntitySource, SourceEvent, Storage};

/// Number of history records returned when the caller has no preference
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Events emitted by the SyncOrchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Baseline done, polling started
    Started { clans: usize, players: usize },

    /// A snapshot was fetched and stored for an entity that had none
    BaselineRegistered { kind: EntityKind, tag: Tag },

    /// Discovery added a newly tracked entity to polling
    EntityDiscovered { kind: EntityKind, tag: Tag },

    /// A change pair went through the dispatcher
    ChangeHandled {
        kind: EntityKind,
        tag: Tag,
        events: Vec<EventType>,
    },

    /// An entity disappeared upstream and is no longer polled
    EntityDropped { kind: EntityKind, tag: Tag },

    /// Upstream maintenance began
    MaintenanceStarted,

    /// Upstream maintenance ended
    MaintenanceEnded { duration: Duration },

    /// A new game season started
    NewSeason { season_id: String },

    /// The final audit flush failed
    FlushFailed { error: String },

    /// Orchestrator stopped
    Stopped { reason: String },
}

/// Core sync orchestrator
///
/// ## Lifecycle
///
/// 1. Create with [`SyncOrchestrator::new()`]
/// 2. Start with [`SyncOrchestrator::run()`]
/// 3. Runs until a shutdown signal is received
/// 4. Final audit flush, bounded by `audit.shutdown_flush_timeout_secs`
///
/// The operations (`register_entity`, `history`, `flush_now`, ...) can be
/// called from other tasks while `run()` is active.
pub struct SyncOrchestrator {
    /// Remote source of clans, players and wars
    source: Arc<dyn EntitySource>,

    /// Registry, snapshots, audit log and war log
    storage: Storage,

    /// Batched audit writer shared with the dispatcher handlers
    audit: AuditSink,

    /// Working sets and phase
    context: Arc<SyncContext>,

    clan_events: EventDispatcher<Clan>,
    player_events: EventDispatcher<Player>,
    war_events: EventDispatcher<WarObservation>,

    /// Interval between discovery passes
    discovery_interval: Duration,

    /// Bound on the final flush
    shutdown_flush_timeout: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<SyncEvent>,
}

impl SyncOrchestrator {
    /// Create a new orchestrator
    ///
    /// # Parameters
    ///
    /// - `source`: Remote entity source
    /// - `storage`: Storage backends
    /// - `config`: Sync configuration
    ///
    /// # Returns
    ///
    /// A tuple of (orchestrator, event_receiver) where event_receiver yields sync events
    pub fn new(
        source: Arc<dyn EntitySource>,
        storage: Storage,
        config: SyncConfig,
    ) -> Result<(Self, mpsc::Receiver<SyncEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.orchestrator.event_channel_capacity);

        let audit = AuditSink::new(Arc::clone(&storage.audit), &config.audit);
        let context = Arc::new(SyncContext::new());
        let cascade = config.orchestrator.register_joined_members;

        let orchestrator = Self {
            clan_events: wiring::dispatcher_for::<ClanDetector>(&audit, &context, cascade),
            player_events: wiring::dispatcher_for::<PlayerDetector>(&audit, &context, cascade),
            war_events: wiring::dispatcher_for::<WarDetector>(&audit, &context, cascade),
            source,
            storage,
            audit,
            context,
            discovery_interval: config.orchestrator.discovery_interval(),
            shutdown_flush_timeout: config.audit.shutdown_flush_timeout(),
            event_tx: tx,
        };

        Ok((orchestrator, rx))
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> SyncPhase {
        self.context.phase()
    }

    /// Tags currently being polled
    pub fn tracked(&self, kind: EntityKind) -> Vec<Tag> {
        self.context.tracked(kind)
    }

    /// The audit sink used by the dispatcher handlers
    pub fn audit(&self) -> &AuditSink {
        &self.audit
    }

    /// Run the orchestrator
    ///
    /// Initializes the source, registers baselines and starts polling, then
    /// handles source events until SIGINT.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error::Authentication)`: The source could not be initialized
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run until the provided oneshot fires (or SIGINT when `None`)
    ///
    /// Embedders that own signal handling pass their own shutdown channel.
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.start().await?;

        let mut events = self.source.watch();
        let mut discovery =
            tokio::time::interval_at(Instant::now() + self.discovery_interval, self.discovery_interval);
        discovery.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = if let Some(mut rx) = shutdown_rx {
            loop {
                tokio::select! {
                    Some(event) = events.next() => {
                        self.handle_source_event(event).await;
                    }

                    _ = discovery.tick() => {
                        self.discover().await;
                    }

                    _ = &mut rx => {
                        break "Shutdown signal".to_string();
                    }
                }
            }
        } else {
            loop {
                tokio::select! {
                    Some(event) = events.next() => {
                        self.handle_source_event(event).await;
                    }

                    _ = discovery.tick() => {
                        self.discover().await;
                    }

                    _ = tokio::signal::ctrl_c() => {
                        break "Interrupted".to_string();
                    }
                }
            }
        };

        info!("Shutdown signal received, stopping sync");
        self.shutdown(reason).await;
        Ok(())
    }

    /// Initialize the source, register baselines and start polling
    ///
    /// A source that fails to initialize is fatal: the error is returned as
    /// [`Error::Authentication`] and nothing is polled.
    pub async fn start(&self) -> Result<()> {
        info!("Initializing entity source '{}'", self.source.source_name());
        if let Err(e) = self.source.init().await {
            error!("Entity source failed to initialize: {}", e);
            return Err(match e {
                Error::Authentication(_) => e,
                other => Error::auth(other.to_string()),
            });
        }

        self.context.set_phase(SyncPhase::RegisteringBaseline);
        let clans = self.sync_new_entities(EntityKind::Clan).await;
        let players = self.sync_new_entities(EntityKind::Player).await;
        self.sync_new_wars().await;

        self.start_polling();
        info!("Sync started with {} clan(s) and {} player(s)", clans, players);
        self.emit_event(SyncEvent::Started { clans, players });
        Ok(())
    }

    /// Resume polling
    pub fn start_polling(&self) {
        self.source.set_polling(true);
        self.context.set_phase(SyncPhase::Polling);
        debug!("Polling enabled");
    }

    /// Pause polling; the audit queue is left as is
    pub fn stop_polling(&self) {
        self.source.set_polling(false);
        self.context.set_phase(SyncPhase::Stopped);
        debug!("Polling disabled");
    }

    /// Make sure every tag has a stored snapshot
    ///
    /// Tags without a snapshot are fetched and stored. Tags that cannot be
    /// fetched are skipped and left out of the result; they are retried by
    /// the next discovery pass.
    ///
    /// For [`EntityKind::War`] the tags are clan tags and the snapshot is
    /// the clan's current war.
    ///
    /// # Returns
    ///
    /// The tags that now have a baseline
    pub async fn ensure_baseline(&self, tags: &[Tag], kind: EntityKind) -> Vec<Tag> {
        let mut accepted = Vec::with_capacity(tags.len());

        for tag in tags {
            match self.baseline_one(kind, tag).await {
                Ok(true) => {
                    info!("Registered baseline for {} {}", kind, tag);
                    self.emit_event(SyncEvent::BaselineRegistered {
                        kind,
                        tag: tag.clone(),
                    });
                    accepted.push(tag.clone());
                }
                Ok(false) => accepted.push(tag.clone()),
                Err(e) if e.is_not_found() && kind == EntityKind::War => {
                    debug!("No war available for clan {}: {}", tag, e);
                }
                Err(e) if e.is_not_found() => {
                    warn!("{} {} not found upstream, skipping: {}", kind, tag, e);
                }
                Err(e) => {
                    warn!("Could not register baseline for {} {}: {}", kind, tag, e);
                }
            }
        }

        accepted
    }

    /// Pick up entities marked for tracking since the last pass
    ///
    /// Skipped while upstream is in maintenance.
    ///
    /// # Returns
    ///
    /// Number of clans and players added to polling
    pub async fn discover(&self) -> usize {
        let previous = self.context.phase();
        if previous == SyncPhase::Maintenance {
            debug!("Skipping discovery during maintenance");
            return 0;
        }

        self.context.set_phase(SyncPhase::Discovering);
        let mut discovered = Vec::new();
        for kind in [EntityKind::Clan, EntityKind::Player] {
            let before = self.context.tracked(kind);
            self.sync_new_entities(kind).await;
            discovered.extend(
                self.context
                    .tracked(kind)
                    .into_iter()
                    .filter(|t| !before.contains(t))
                    .map(|t| (kind, t)),
            );
        }
        self.sync_new_wars().await;

        if self.context.phase() == SyncPhase::Discovering {
            self.context.set_phase(previous);
        }

        for (kind, tag) in &discovered {
            info!("Added {} {} to sync", kind, tag);
            self.emit_event(SyncEvent::EntityDiscovered {
                kind: *kind,
                tag: tag.clone(),
            });
        }
        discovered.len()
    }

    /// Handle one event from the source
    pub async fn handle_source_event(&self, event: SourceEvent) {
        match event {
            SourceEvent::ClanChanged { old, new } => self.handle_clan_change(&old, &new).await,
            SourceEvent::PlayerChanged { old, new } => self.handle_player_change(&old, &new).await,
            SourceEvent::WarChanged { clan_tag, old, new } => {
                self.handle_war_change(clan_tag, old, new).await
            }
            SourceEvent::NotFound { kind, tag } => self.drop_entity(kind, &tag).await,
            SourceEvent::MaintenanceStart => {
                if self.context.phase() != SyncPhase::Maintenance {
                    warn!("Remote source entered maintenance, data sync paused");
                    self.context.set_phase(SyncPhase::Maintenance);
                    self.emit_event(SyncEvent::MaintenanceStarted);
                }
            }
            SourceEvent::MaintenanceEnd { duration } => {
                info!("Maintenance ended after {:?}, data sync resumed", duration);
                if self.context.phase() == SyncPhase::Maintenance {
                    self.context.set_phase(SyncPhase::Polling);
                }
                self.emit_event(SyncEvent::MaintenanceEnded { duration });
            }
            SourceEvent::TransientError { kind, tag, message } => {
                warn!("Polling {} {} failed: {}", kind, tag, message);
            }
            SourceEvent::NewSeason { season_id } => {
                info!("New season started: {}", season_id);
                self.emit_event(SyncEvent::NewSeason { season_id });
            }
        }
    }

    /// Queue an audit record for a clan
    pub fn record_clan_change(&self, tag: &Tag, message: impl Into<String>, event_type: EventType) {
        self.audit.record(tag, message, event_type, EntityKind::Clan);
    }

    /// Queue an audit record for a player and store its latest snapshot
    ///
    /// The snapshot write is best-effort: a storage failure or an unregistered
    /// player is logged and the record stays queued. Only a snapshot that
    /// cannot be encoded is returned as an error.
    pub async fn record_player_change(
        &self,
        tag: &Tag,
        message: impl Into<String>,
        event_type: EventType,
        snapshot: &Player,
    ) -> Result<()> {
        self.audit.record(tag, message, event_type, EntityKind::Player);
        let json = serde_json::to_value(snapshot)?;
        if let Err(e) = self.persist_snapshot(EntityKind::Player, tag, json).await {
            warn!("Could not store snapshot of {} {}: {}", EntityKind::Player, tag, e);
        }
        Ok(())
    }

    /// Flush the audit queue now
    pub async fn flush_now(&self) -> Result<FlushOutcome> {
        self.audit.flush_now().await
    }

    /// Register a clan or player typed in by a user
    ///
    /// The tag is validated against the game's tag alphabet. A newly
    /// created entity gets an `ADD` audit record. Entities marked for
    /// tracking are picked up by the next discovery pass.
    pub async fn register_entity(&self, kind: EntityKind, raw_tag: &str, track: bool) -> Result<Registration> {
        if kind == EntityKind::War {
            return Err(Error::config("wars are tracked through their clan"));
        }
        let tag = Tag::parse_strict(raw_tag)?;

        let registration = self.storage.registry.register(kind, &tag, track).await?;
        if registration.created {
            info!("Registered {} {}", kind, tag);
            self.audit.record(
                &tag,
                format!("{} added to database", capitalized(kind)),
                EventType::EntityAdded,
                kind,
            );
        }
        if track {
            self.context.clear_dropped(kind, &tag);
        }
        Ok(registration)
    }

    /// Turn tracking of a registered entity on or off
    ///
    /// Disabling removes the entity from polling right away; enabling takes
    /// effect on the next discovery pass.
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: Flag updated
    /// - `Ok(false)`: Entity is not registered
    pub async fn set_tracked(&self, kind: EntityKind, tag: &Tag, track: bool) -> Result<bool> {
        if !self.storage.registry.set_tracked(kind, tag, track).await? {
            return Ok(false);
        }

        if track {
            self.context.clear_dropped(kind, tag);
            return Ok(true);
        }

        if self.context.untrack(kind, tag) {
            self.source.remove_tracked(kind, tag).await?;
        }
        if kind == EntityKind::Clan && self.context.untrack(EntityKind::War, tag) {
            self.source.remove_tracked(EntityKind::War, tag).await?;
        }
        info!("Stopped tracking {} {}", kind, tag);
        Ok(true)
    }

    /// Recent audit records of an entity, newest first
    ///
    /// War history is read from the owning clan.
    pub async fn history(
        &self,
        kind: EntityKind,
        tag: &Tag,
        category: HistoryCategory,
        limit: usize,
    ) -> Result<Vec<AuditLogRecord>> {
        let owner = self.registered(kind.audit_owner(), tag).await?;
        self.storage
            .audit
            .history(owner.internal_id, category, limit)
            .await
    }

    /// Last stored snapshot of an entity
    pub async fn cached_snapshot(&self, kind: EntityKind, tag: &Tag) -> Result<Option<Value>> {
        let owner = self.registered(kind.audit_owner(), tag).await?;
        Ok(self
            .storage
            .snapshots
            .get_snapshot(kind, owner.internal_id)
            .await?
            .map(|s| s.snapshot))
    }

    /// Current JSON of an entity, served from storage during maintenance
    pub async fn current_snapshot(&self, kind: EntityKind, tag: &Tag) -> Result<Value> {
        if self.context.phase() != SyncPhase::Maintenance {
            match self.source.fetch(kind, tag).await {
                Ok(snapshot) => return snapshot.to_json(),
                Err(Error::Maintenance(msg)) => {
                    debug!("Source in maintenance ({}), serving stored snapshot", msg)
                }
                Err(e) => return Err(e),
            }
        }

        self.cached_snapshot(kind, tag)
            .await?
            .ok_or_else(|| Error::maintenance(format!("no stored snapshot for {kind} {tag}")))
    }

    /// Recent wars of a clan, newest first
    pub async fn war_log(&self, clan_tag: &Tag, limit: usize) -> Result<Vec<WarLogRecord>> {
        let clan = self.registered(EntityKind::Clan, clan_tag).await?;
        self.storage.wars.war_log(clan.internal_id, limit).await
    }

    async fn registered(&self, kind: EntityKind, tag: &Tag) -> Result<crate::model::TrackedEntity> {
        self.storage
            .registry
            .lookup(kind, tag)
            .await?
            .ok_or_else(|| Error::not_found(format!("{kind} {tag} is not registered")))
    }

    async fn shutdown(&self, reason: String) {
        self.stop_polling();

        match self.audit.close(self.shutdown_flush_timeout).await {
            Ok(outcome) => info!("Final audit flush wrote {} record(s)", outcome.written),
            Err(e) => {
                error!("Final audit flush failed: {}", e);
                self.emit_event(SyncEvent::FlushFailed {
                    error: e.to_string(),
                });
            }
        }

        self.emit_event(SyncEvent::Stopped { reason });
        info!("Sync stopped");
    }

    /// Baseline and start polling registry tags not yet in the working set
    async fn sync_new_entities(&self, kind: EntityKind) -> usize {
        let tags = match self.storage.registry.tracked_tags(kind).await {
            Ok(tags) => tags,
            Err(e) => {
                error!("Could not read tracked {} tags: {}", kind, e);
                return 0;
            }
        };

        let fresh = self.context.untracked(kind, &tags);
        if fresh.is_empty() {
            return 0;
        }
        debug!("Found {} new {} tag(s) to sync", fresh.len(), kind);

        let accepted = self.ensure_baseline(&fresh, kind).await;
        self.begin_polling(kind, &accepted).await
    }

    /// Baseline and start polling the wars of tracked clans
    async fn sync_new_wars(&self) {
        let clans = self.context.tracked(EntityKind::Clan);
        let fresh = self.context.untracked(EntityKind::War, &clans);
        if fresh.is_empty() {
            return;
        }
        let accepted = self.ensure_baseline(&fresh, EntityKind::War).await;
        self.begin_polling(EntityKind::War, &accepted).await;
    }

    async fn begin_polling(&self, kind: EntityKind, tags: &[Tag]) -> usize {
        let added = self.context.track(kind, tags);
        if added.is_empty() {
            return 0;
        }

        if let Err(e) = self.source.add_tracked(kind, &added).await {
            error!("Source refused {} new {} tag(s): {}", added.len(), kind, e);
            for tag in &added {
                self.context.untrack(kind, tag);
            }
            return 0;
        }
        added.len()
    }

    async fn baseline_one(&self, kind: EntityKind, tag: &Tag) -> Result<bool> {
        let entity = match kind {
            EntityKind::War => self.registered(EntityKind::Clan, tag).await?,
            _ => self.storage.registry.register(kind, tag, false).await?.entity,
        };

        if self
            .storage
            .snapshots
            .has_snapshot(kind, entity.internal_id)
            .await?
        {
            return Ok(false);
        }

        let snapshot = self.source.fetch(kind, tag).await?;
        self.storage
            .snapshots
            .put_snapshot(kind, entity.internal_id, &snapshot.to_json()?)
            .await?;
        if kind != EntityKind::War {
            self.storage.registry.mark_synced(kind, tag, Utc::now()).await?;
        }
        Ok(true)
    }

    async fn handle_clan_change(&self, old: &Clan, new: &Clan) {
        let report = {
            let _hold = self.audit.hold();
            let report = self.clan_events.dispatch(old, new);
            self.register_pending().await;
            report
        };

        self.after_dispatch(EntityKind::Clan, &new.tag, serde_json::to_value(new), report)
            .await;
    }

    async fn handle_player_change(&self, old: &Player, new: &Player) {
        let report = {
            let _hold = self.audit.hold();
            let report = self.player_events.dispatch(old, new);
            self.register_pending().await;
            report
        };

        self.after_dispatch(EntityKind::Player, &new.tag, serde_json::to_value(new), report)
            .await;
    }

    async fn handle_war_change(&self, clan_tag: Tag, old: Option<War>, new: War) {
        let previous = WarObservation::new(clan_tag.clone(), old);
        let current = WarObservation::new(clan_tag.clone(), Some(new));

        let report = {
            let _hold = self.audit.hold();
            let report = self.war_events.dispatch(&previous, &current);
            self.register_pending().await;
            report
        };

        if let Some(war) = current.war.as_ref() {
            self.record_war(&clan_tag, war).await;
        }
        self.after_dispatch(EntityKind::War, &clan_tag, serde_json::to_value(&current.war), report)
            .await;
    }

    async fn after_dispatch(
        &self,
        kind: EntityKind,
        tag: &Tag,
        snapshot: serde_json::Result<Value>,
        report: DispatchReport,
    ) {
        if report.failed_handlers > 0 {
            warn!("{} handler(s) failed for {} {}", report.failed_handlers, kind, tag);
        }

        match snapshot {
            Ok(json) => {
                if let Err(e) = self.persist_snapshot(kind, tag, json).await {
                    warn!("Could not store snapshot of {} {}: {}", kind, tag, e);
                }
            }
            Err(e) => warn!("Could not encode snapshot of {} {}: {}", kind, tag, e),
        }

        if !report.is_empty() {
            debug!("Handled {:?} for {} {}", report.matched, kind, tag);
            self.emit_event(SyncEvent::ChangeHandled {
                kind,
                tag: tag.clone(),
                events: report.matched,
            });
        }
    }

    async fn persist_snapshot(&self, kind: EntityKind, tag: &Tag, json: Value) -> Result<()> {
        let owner = self.registered(kind.audit_owner(), tag).await?;
        self.storage
            .snapshots
            .put_snapshot(kind, owner.internal_id, &json)
            .await?;
        if kind != EntityKind::War {
            self.storage.registry.mark_synced(kind, tag, Utc::now()).await?;
        }
        Ok(())
    }

    async fn record_war(&self, clan_tag: &Tag, war: &War) {
        if war.phase() == WarPhase::None {
            return;
        }
        let clan = match self.registered(EntityKind::Clan, clan_tag).await {
            Ok(clan) => clan,
            Err(e) => {
                warn!("Cannot log war of {}: {}", clan_tag, e);
                return;
            }
        };
        let Some(record) = WarLogRecord::from_war(clan.internal_id, war) else {
            debug!("War of {} has no identity yet, not logged", clan_tag);
            return;
        };

        match self.storage.wars.upsert_war(&record).await {
            Ok(WarUpsert::Inserted(id)) => info!("Logged new war {} of {}", id, clan_tag),
            Ok(WarUpsert::Updated(id)) => debug!("Updated war {} of {}", id, clan_tag),
            Err(e) => warn!("Could not log war of {}: {}", clan_tag, e),
        }
    }

    /// Register players queued by the handlers during the last dispatch
    async fn register_pending(&self) {
        for tag in self.context.take_registrations() {
            match self.storage.registry.lookup(EntityKind::Player, &tag).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => {
                    warn!("Could not look up player {}: {}", tag, e);
                    continue;
                }
            }

            match self.storage.registry.register(EntityKind::Player, &tag, true).await {
                Ok(registration) if registration.created => {
                    info!("Registered player {} for tracking", tag);
                    self.audit.record(
                        &tag,
                        "Player added to database",
                        EventType::EntityAdded,
                        EntityKind::Player,
                    );
                }
                Ok(_) => {}
                Err(e) => warn!("Could not register player {}: {}", tag, e),
            }
        }
    }

    async fn drop_entity(&self, kind: EntityKind, tag: &Tag) {
        warn!("{} {} no longer exists upstream, removing it from polling", kind, tag);
        self.context.untrack(kind, tag);
        self.context.mark_dropped(kind, tag);
        if let Err(e) = self.source.remove_tracked(kind, tag).await {
            debug!("Source could not forget {} {}: {}", kind, tag, e);
        }

        if kind == EntityKind::Clan && self.context.untrack(EntityKind::War, tag) {
            if let Err(e) = self.source.remove_tracked(EntityKind::War, tag).await {
                debug!("Source could not forget war of {}: {}", tag, e);
            }
        }

        self.emit_event(SyncEvent::EntityDropped {
            kind,
            tag: tag.clone(),
        });
    }

    /// Emit a sync event
    ///
    /// # Parameters
    ///
    /// - `event`: The event to emit
    fn emit_event(&self, event: SyncEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

fn capitalized(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Clan => "Clan",
        EntityKind::Player => "Player",
        EntityKind::War => "War",
    }
}
