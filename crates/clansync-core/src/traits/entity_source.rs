// # Entity Source Trait
//
// Defines the interface to the remote game API: fetching single entities
// and streaming observed changes of the tracked ones.
//
// ## Implementations
//
// - HTTP polling client: `clansync-source-http` crate
// - Scripted sources in the contract tests
//
// ## Usage
//
// ```rust,ignore
// use clansync_core::{EntityKind, EntitySource, Tag};
// use tokio_stream::StreamExt;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* EntitySource implementation */;
//     source.init().await?;
//
//     let tag = Tag::parse("#2PP")?;
//     source.add_tracked(EntityKind::Clan, &[tag]).await?;
//
//     let mut events = source.watch();
//     while let Some(event) = events.next().await {
//         println!("observed: {:?}", event);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::pin::Pin;
use std::time::Duration;
use tokio_stream::Stream;

use crate::model::{Clan, EntityKind, Player, Tag, War};

/// Something the source observed while polling
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// A tracked clan differs from its previous observation
    ClanChanged { old: Clan, new: Clan },

    /// A tracked player differs from its previous observation
    PlayerChanged { old: Player, new: Player },

    /// A tracked clan's war report differs from the previous one
    ///
    /// `old` is `None` when no report was seen before.
    WarChanged {
        clan_tag: Tag,
        old: Option<War>,
        new: War,
    },

    /// A tracked entity no longer exists upstream
    ///
    /// The source stops polling the tag before emitting this.
    NotFound { kind: EntityKind, tag: Tag },

    /// Upstream entered maintenance; no changes are emitted until it ends
    MaintenanceStart,

    /// Upstream left maintenance
    MaintenanceEnd { duration: Duration },

    /// A single request failed; polling continues
    TransientError { kind: EntityKind, tag: Tag, message: String },

    /// A new game season started
    NewSeason { season_id: String },
}

/// Entity returned by [`EntitySource::fetch`]
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Clan(Clan),
    Player(Player),
    War(War),
}

impl Snapshot {
    /// Kind of the fetched entity
    pub fn kind(&self) -> EntityKind {
        match self {
            Snapshot::Clan(_) => EntityKind::Clan,
            Snapshot::Player(_) => EntityKind::Player,
            Snapshot::War(_) => EntityKind::War,
        }
    }

    /// JSON form persisted as the entity snapshot
    pub fn to_json(&self) -> Result<serde_json::Value, crate::Error> {
        let value = match self {
            Snapshot::Clan(clan) => serde_json::to_value(clan)?,
            Snapshot::Player(player) => serde_json::to_value(player)?,
            Snapshot::War(war) => serde_json::to_value(war)?,
        };
        Ok(value)
    }
}

/// Trait for remote entity sources
///
/// A source keeps its own working set of tracked tags per [`EntityKind`]
/// and its own cache of the last observation per tag. The first observation
/// of a tag only primes the cache; later observations that differ are
/// emitted as `(old, new)` pairs on the [`watch`](EntitySource::watch)
/// stream.
///
/// Wars are tracked by clan tag: adding a tag under [`EntityKind::War`]
/// polls that clan's current war.
///
/// # Responsibilities
///
/// ## Allowed
/// - ✅ Network I/O against the remote API
/// - ✅ One background polling task per `watch()` call
/// - ✅ Detecting maintenance windows and pausing emission during them
///
/// ## Forbidden
/// - ❌ Writing to storage (owned by `SyncOrchestrator`)
/// - ❌ Interpreting changes (owned by the detectors)
/// - ❌ Retrying failed requests beyond the next polling round
///
/// # Ordering
///
/// Events for the same entity must be emitted in observation order.
#[async_trait]
pub trait EntitySource: Send + Sync {
    /// Authenticate and verify connectivity
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Source is ready
    /// - `Err(Error::Authentication)`: Credentials were rejected; fatal
    /// - `Err(Error)`: Any other startup failure
    async fn init(&self) -> Result<(), crate::Error>;

    /// Fetch the current state of one entity
    ///
    /// # Returns
    ///
    /// - `Ok(Snapshot)`: Current state
    /// - `Err(Error::NotFound)`: Entity does not exist upstream
    /// - `Err(Error::Maintenance)`: Upstream is in maintenance
    /// - `Err(Error)`: Transport or decoding failure
    async fn fetch(&self, kind: EntityKind, tag: &Tag) -> Result<Snapshot, crate::Error>;

    /// Add tags to the polling working set
    ///
    /// Adding a tag that is already tracked is a no-op.
    async fn add_tracked(&self, kind: EntityKind, tags: &[Tag]) -> Result<(), crate::Error>;

    /// Remove a tag from the polling working set and forget its cache
    async fn remove_tracked(&self, kind: EntityKind, tag: &Tag) -> Result<(), crate::Error>;

    /// Pause or resume polling
    ///
    /// While paused the source makes no requests. The cache is kept, so
    /// changes that happen during the pause are reported once polling
    /// resumes.
    fn set_polling(&self, enabled: bool);

    /// Stream of observed changes
    ///
    /// The stream runs until the source is dropped. It must be
    /// cancellation-safe: dropping the stream stops the polling task.
    fn watch(&self) -> Pin<Box<dyn Stream<Item = SourceEvent> + Send + 'static>>;

    /// Short name used in logs
    fn source_name(&self) -> &'static str;
}
