// # HTTP Entity Source
//
// This crate provides the polling client for the public game API.
//
// ## Purpose
//
// - Verifies the API token at startup
// - Fetches single clans, players and current wars
// - Polls the tracked working set on a fixed interval and reports every
//   entity that differs from its previous observation
// - Detects maintenance windows and season changes
//
// ## Architecture
//
// `watch()` spawns one polling task. Each round walks the working set in
// order; the first observation of a tag only primes the cache, later
// observations that differ are sent as `(old, new)` pairs. A round stops at
// the first maintenance answer and no changes are emitted until upstream
// answers normally again.

use clansync_core::config::SourceConfig;
use clansync_core::model::{Clan, EntityKind, Player, Tag, War};
use clansync_core::traits::{EntitySource, Snapshot, SourceEvent};
use clansync_core::{Error, Result};

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, Utc};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::Stream;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

/// Default polling interval
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Default per-request timeout
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

/// Thin client for the upstream REST API
#[derive(Clone)]
struct Api {
    /// API base URL without trailing slash
    base_url: String,

    /// Bearer token
    /// ⚠️ NEVER log this value
    api_token: String,

    client: reqwest::Client,
}

impl Api {
    async fn get_json(&self, kind: EntityKind, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::http(format!("Request to {} failed: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(classify_status(status.as_u16(), kind, path, &body));
        }

        response
            .json()
            .await
            .map_err(|e| Error::http(format!("Invalid JSON from {}: {}", path, e)))
    }

    async fn fetch(&self, kind: EntityKind, tag: &Tag) -> Result<Snapshot> {
        match kind {
            EntityKind::Clan => {
                let raw = self
                    .get_json(kind, &format!("/clans/{}", tag.url_encoded()))
                    .await?;
                let clan: Clan = serde_json::from_value(normalize_clan_json(raw))?;
                Ok(Snapshot::Clan(clan))
            }
            EntityKind::Player => {
                let raw = self
                    .get_json(kind, &format!("/players/{}", tag.url_encoded()))
                    .await?;
                let player: Player = serde_json::from_value(raw)?;
                Ok(Snapshot::Player(player))
            }
            EntityKind::War => {
                let raw = self
                    .get_json(kind, &format!("/clans/{}/currentwar", tag.url_encoded()))
                    .await?;
                let war: War = serde_json::from_value(raw)?;
                Ok(Snapshot::War(war))
            }
        }
    }
}

/// Map a non-success status to the error taxonomy
///
/// A 403 on a war endpoint means the clan's war log is private, which is
/// reported as not found so the war is dropped from polling.
fn classify_status(status: u16, kind: EntityKind, path: &str, body: &str) -> Error {
    match status {
        403 if kind == EntityKind::War => {
            Error::not_found(format!("War log behind {} is private", path))
        }
        401 | 403 => Error::auth(format!(
            "Access denied for {}: invalid API token or address not allowed. Status: {}",
            path, status
        )),
        404 => Error::not_found(format!("{} does not exist", path)),
        429 => Error::http(format!("Rate limit exceeded. Please retry later. Status: {}", status)),
        503 => Error::maintenance(format!("Upstream is in maintenance: {}", body)),
        500..=599 => Error::http(format!("Upstream server error (transient): {} - {}", status, body)),
        _ => Error::http(format!("Request to {} failed: {} - {}", path, status, body)),
    }
}

/// Rename upstream clan fields to the snapshot layout
///
/// Upstream reports the member count as `members` and the roster as
/// `memberList`; snapshots use `memberCount` and `members`.
fn normalize_clan_json(mut raw: Value) -> Value {
    if let Some(object) = raw.as_object_mut() {
        if let Some(count) = object.remove("members").filter(Value::is_number) {
            object.insert("memberCount".to_string(), count);
        }
        if let Some(list) = object.remove("memberList") {
            object.insert("members".to_string(), list);
        }
    }
    raw
}

/// Identifier of the season running at `now`, e.g. `2024-03`
///
/// A season ends on the last Monday of its month at 05:00 UTC.
fn season_id(now: DateTime<Utc>) -> Option<String> {
    let (year, month) = (now.year(), now.month());
    let (year, month) = if now < season_end(year, month)? {
        (year, month)
    } else {
        next_month(year, month)
    };
    Some(format!("{:04}-{:02}", year, month))
}

fn season_end(year: i32, month: u32) -> Option<DateTime<Utc>> {
    let (next_year, next_month) = next_month(year, month);
    let last_day = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()?;
    let back = i64::from(last_day.weekday().num_days_from_monday());
    let monday = last_day - ChronoDuration::days(back);
    Some(monday.and_hms_opt(5, 0, 0)?.and_utc())
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 { (year + 1, 1) } else { (year, month + 1) }
}

/// Result of recording a polled snapshot
#[derive(Debug, PartialEq)]
enum Observation {
    /// Tag left the working set while it was being fetched
    Untracked,
    /// No earlier observation; cache primed
    First,
    Unchanged,
    Changed(Snapshot),
}

/// Tracked tags and the last observation of each
#[derive(Debug, Default)]
struct WorkingSet {
    tags: HashMap<EntityKind, BTreeSet<Tag>>,
    cache: HashMap<(EntityKind, Tag), Snapshot>,
}

impl WorkingSet {
    fn add(&mut self, kind: EntityKind, tags: &[Tag]) {
        self.tags.entry(kind).or_default().extend(tags.iter().cloned());
    }

    fn remove(&mut self, kind: EntityKind, tag: &Tag) {
        if let Some(set) = self.tags.get_mut(&kind) {
            set.remove(tag);
        }
        self.cache.remove(&(kind, tag.clone()));
    }

    fn is_tracked(&self, kind: EntityKind, tag: &Tag) -> bool {
        self.tags.get(&kind).is_some_and(|set| set.contains(tag))
    }

    /// Every tracked (kind, tag), clans first
    fn targets(&self) -> Vec<(EntityKind, Tag)> {
        [EntityKind::Clan, EntityKind::War, EntityKind::Player]
            .into_iter()
            .flat_map(|kind| {
                self.tags
                    .get(&kind)
                    .into_iter()
                    .flatten()
                    .map(move |tag| (kind, tag.clone()))
            })
            .collect()
    }

    fn prime(&mut self, kind: EntityKind, tag: &Tag, snapshot: Snapshot) {
        self.cache.insert((kind, tag.clone()), snapshot);
    }

    fn observe(&mut self, kind: EntityKind, tag: &Tag, snapshot: Snapshot) -> Observation {
        if !self.is_tracked(kind, tag) {
            return Observation::Untracked;
        }
        match self.cache.insert((kind, tag.clone()), snapshot.clone()) {
            None => Observation::First,
            Some(previous) if previous == snapshot => Observation::Unchanged,
            Some(previous) => Observation::Changed(previous),
        }
    }
}

/// Pair two observations of the same entity into a source event
fn change_event(tag: &Tag, old: Snapshot, new: Snapshot) -> Option<SourceEvent> {
    match (old, new) {
        (Snapshot::Clan(old), Snapshot::Clan(new)) => Some(SourceEvent::ClanChanged { old, new }),
        (Snapshot::Player(old), Snapshot::Player(new)) => {
            Some(SourceEvent::PlayerChanged { old, new })
        }
        (Snapshot::War(old), Snapshot::War(new)) => Some(SourceEvent::WarChanged {
            clan_tag: tag.clone(),
            old: Some(old),
            new,
        }),
        _ => None,
    }
}

/// Polling client for the public game API
pub struct HttpEntitySource {
    api: Api,

    /// Interval between polling rounds
    poll_interval: Duration,

    working: Arc<Mutex<WorkingSet>>,

    polling: Arc<AtomicBool>,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for HttpEntitySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEntitySource")
            .field("base_url", &self.api.base_url)
            .field("api_token", &"<REDACTED>")
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl HttpEntitySource {
    /// Create a new HTTP entity source
    ///
    /// # Parameters
    ///
    /// - `base_url`: API base URL (e.g., "https://api.clashofclans.com/v1")
    /// - `api_token`: Bearer token from the developer portal
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Result<Self> {
        Self::with_intervals(
            base_url,
            api_token,
            Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    /// Create with custom polling interval and request timeout
    pub fn with_intervals(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        poll_interval: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api: Api {
                base_url: base_url.into().trim_end_matches('/').to_string(),
                api_token,
                client,
            },
            poll_interval,
            working: Arc::new(Mutex::new(WorkingSet::default())),
            polling: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Build from an `Http` source configuration
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        match config {
            SourceConfig::Http {
                base_url,
                api_token,
                poll_interval_secs,
                request_timeout_secs,
            } => Self::with_intervals(
                base_url.clone(),
                api_token.clone(),
                Duration::from_secs(*poll_interval_secs),
                Duration::from_secs(*request_timeout_secs),
            ),
            _ => Err(Error::config("Invalid config for HTTP entity source")),
        }
    }
}

#[async_trait::async_trait]
impl EntitySource for HttpEntitySource {
    async fn init(&self) -> Result<()> {
        info!("Checking API access at {}", self.api.base_url);
        self.api
            .get_json(EntityKind::Clan, "/locations?limit=1")
            .await?;
        info!("API token accepted");
        Ok(())
    }

    async fn fetch(&self, kind: EntityKind, tag: &Tag) -> Result<Snapshot> {
        let snapshot = self.api.fetch(kind, tag).await?;
        self.working.lock().await.prime(kind, tag, snapshot.clone());
        Ok(snapshot)
    }

    async fn add_tracked(&self, kind: EntityKind, tags: &[Tag]) -> Result<()> {
        self.working.lock().await.add(kind, tags);
        debug!("Polling {} more {} tag(s)", tags.len(), kind);
        Ok(())
    }

    async fn remove_tracked(&self, kind: EntityKind, tag: &Tag) -> Result<()> {
        self.working.lock().await.remove(kind, tag);
        debug!("Stopped polling {} {}", kind, tag);
        Ok(())
    }

    fn set_polling(&self, enabled: bool) {
        self.polling.store(enabled, Ordering::SeqCst);
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = SourceEvent> + Send + 'static>> {
        let (tx, rx) = mpsc::unbounded_channel();

        let api = self.api.clone();
        let working = Arc::clone(&self.working);
        let polling = Arc::clone(&self.polling);
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            info!("Starting entity polling (interval={:?})", poll_interval);
            poll_loop(api, working, polling, poll_interval, tx).await;
            debug!("Entity polling stopped");
        });

        Box::pin(UnboundedReceiverStream::new(rx))
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}

async fn poll_loop(
    api: Api,
    working: Arc<Mutex<WorkingSet>>,
    polling: Arc<AtomicBool>,
    poll_interval: Duration,
    tx: mpsc::UnboundedSender<SourceEvent>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut maintenance_since: Option<Instant> = None;
    let mut season: Option<String> = None;

    loop {
        ticker.tick().await;
        if tx.is_closed() {
            break;
        }
        if !polling.load(Ordering::SeqCst) {
            continue;
        }

        if let Some(current) = season_id(Utc::now()) {
            if season.as_ref().is_some_and(|previous| *previous != current) {
                info!("Season {} started", current);
                if tx.send(SourceEvent::NewSeason { season_id: current.clone() }).is_err() {
                    break;
                }
            }
            season = Some(current);
        }

        let targets = working.lock().await.targets();
        for (kind, tag) in targets {
            let event = match api.fetch(kind, &tag).await {
                Ok(snapshot) => {
                    if let Some(since) = maintenance_since.take() {
                        let duration = since.elapsed();
                        info!("Maintenance over after {:?}", duration);
                        if tx.send(SourceEvent::MaintenanceEnd { duration }).is_err() {
                            return;
                        }
                    }
                    match working.lock().await.observe(kind, &tag, snapshot.clone()) {
                        Observation::Changed(previous) => change_event(&tag, previous, snapshot),
                        Observation::First | Observation::Unchanged | Observation::Untracked => None,
                    }
                }
                Err(Error::Maintenance(reason)) => {
                    if maintenance_since.is_none() {
                        warn!("Upstream entered maintenance: {}", reason);
                        maintenance_since = Some(Instant::now());
                        if tx.send(SourceEvent::MaintenanceStart).is_err() {
                            return;
                        }
                    }
                    break;
                }
                Err(e) if e.is_not_found() => {
                    warn!("{} {} not found, no longer polling it: {}", kind, tag, e);
                    working.lock().await.remove(kind, &tag);
                    Some(SourceEvent::NotFound { kind, tag })
                }
                Err(e) => {
                    error!("Polling {} {} failed: {}", kind, tag, e);
                    Some(SourceEvent::TransientError {
                        kind,
                        tag,
                        message: e.to_string(),
                    })
                }
            };

            if let Some(event) = event {
                if tx.send(event).is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn tag(raw: &str) -> Tag {
        Tag::parse(raw).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        let path = "/clans/%232PP";
        assert!(classify_status(404, EntityKind::Clan, path, "").is_not_found());
        assert!(matches!(
            classify_status(503, EntityKind::Clan, path, "inMaintenance"),
            Error::Maintenance(_)
        ));
        assert!(matches!(
            classify_status(403, EntityKind::Clan, path, ""),
            Error::Authentication(_)
        ));
        assert!(classify_status(403, EntityKind::War, path, "").is_not_found());
        assert!(matches!(classify_status(429, EntityKind::Player, path, ""), Error::Http(_)));
        assert!(matches!(classify_status(500, EntityKind::Player, path, ""), Error::Http(_)));
    }

    #[test]
    fn test_clan_json_normalized() {
        let raw = json!({
            "tag": "#2PP",
            "name": "Alpha",
            "clanLevel": 12,
            "members": 2,
            "memberList": [
                { "tag": "#P1", "name": "Ann", "role": "leader", "townHallLevel": 14 },
                { "tag": "#P2", "name": "Bob", "role": "admin", "townHallLevel": 12 }
            ]
        });

        let clan: Clan = serde_json::from_value(normalize_clan_json(raw)).unwrap();
        assert_eq!(clan.member_count, 2);
        assert_eq!(clan.level, 12);
        assert_eq!(clan.members.len(), 2);
        assert_eq!(clan.members[1].tag, tag("#P2"));
    }

    #[test]
    fn test_season_boundaries() {
        // last Monday of March 2024 is the 25th
        let before = Utc.with_ymd_and_hms(2024, 3, 25, 4, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 3, 25, 5, 0, 0).unwrap();
        assert_eq!(season_id(before).as_deref(), Some("2024-03"));
        assert_eq!(season_id(after).as_deref(), Some("2024-04"));

        let new_year = Utc.with_ymd_and_hms(2024, 12, 31, 12, 0, 0).unwrap();
        assert_eq!(season_id(new_year).as_deref(), Some("2025-01"));
    }

    #[test]
    fn test_working_set_observations() {
        let mut working = WorkingSet::default();
        let clan = Clan::new(tag("#2PP"), "Alpha");

        assert_eq!(
            working.observe(EntityKind::Clan, &tag("#2PP"), Snapshot::Clan(clan.clone())),
            Observation::Untracked
        );

        working.add(EntityKind::Clan, &[tag("#2PP")]);
        assert_eq!(
            working.observe(EntityKind::Clan, &tag("#2PP"), Snapshot::Clan(clan.clone())),
            Observation::First
        );
        assert_eq!(
            working.observe(EntityKind::Clan, &tag("#2PP"), Snapshot::Clan(clan.clone())),
            Observation::Unchanged
        );

        let mut renamed = clan.clone();
        renamed.name = "Beta".to_string();
        assert_eq!(
            working.observe(EntityKind::Clan, &tag("#2PP"), Snapshot::Clan(renamed)),
            Observation::Changed(Snapshot::Clan(clan))
        );

        working.remove(EntityKind::Clan, &tag("#2PP"));
        assert!(working.targets().is_empty());
    }

    #[test]
    fn test_baseline_fetch_primes_cache() {
        let mut working = WorkingSet::default();
        let player = Player::new(tag("#P1"), "Ann", 12);

        working.prime(EntityKind::Player, &tag("#P1"), Snapshot::Player(player.clone()));
        working.add(EntityKind::Player, &[tag("#P1")]);

        let mut upgraded = player.clone();
        upgraded.town_hall_level = 13;
        let observation =
            working.observe(EntityKind::Player, &tag("#P1"), Snapshot::Player(upgraded.clone()));
        let Observation::Changed(previous) = observation else {
            panic!("expected a change, got {observation:?}");
        };
        assert_eq!(
            change_event(&tag("#P1"), previous, Snapshot::Player(upgraded.clone())),
            Some(SourceEvent::PlayerChanged {
                old: player,
                new: upgraded,
            })
        );
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let source = HttpEntitySource::new("https://api.example.test/v1/", "secret_token_12345")
            .unwrap();
        let debug_str = format!("{:?}", source);
        assert!(!debug_str.contains("secret_token_12345"));
        assert!(debug_str.contains("https://api.example.test/v1\""));
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(matches!(
            HttpEntitySource::new("https://api.example.test/v1", ""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_targets_list_clans_first() {
        let mut working = WorkingSet::default();
        working.add(EntityKind::Player, &[tag("#P1")]);
        working.add(EntityKind::War, &[tag("#2PP")]);
        working.add(EntityKind::Clan, &[tag("#2PP")]);

        assert_eq!(
            working.targets(),
            vec![
                (EntityKind::Clan, tag("#2PP")),
                (EntityKind::War, tag("#2PP")),
                (EntityKind::Player, tag("#P1")),
            ]
        );
    }
}
