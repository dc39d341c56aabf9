// # clansync-core
//
// Core library for tracking clans, players and wars of a remote game API
// and keeping an audit trail of what changed.
//
// ## Architecture Overview
//
// - **EntitySource**: Trait for fetching entities and reporting changed pairs
// - **EntityRegistry / SnapshotStore / AuditStore / WarLogStore**: Storage traits
// - **ChangeDetector**: Pure diffing of two snapshots into typed changes
// - **EventDispatcher**: Ordered filter/handler table per entity kind
// - **AuditSink**: Batched, timer-driven audit log writer
// - **SyncOrchestrator**: Baseline, polling, discovery and shutdown
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Detection, dispatch and persistence are independent
// 2. **Event-Driven**: Changes arrive as async streams from the source
// 3. **Library-First**: The daemon is a thin wrapper over this crate
// 4. **At-least-once Audit**: Records stay queued until the store accepts them

pub mod audit;
pub mod config;
pub mod detector;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use audit::{AuditSink, FlushOutcome, PendingAudit};
pub use config::{AuditConfig, OrchestratorConfig, SourceConfig, StorageConfig, SyncConfig};
pub use detector::{ChangeDetector, ClanDetector, PlayerDetector, WarDetector, WarObservation};
pub use dispatch::{DispatchReport, EventDispatcher};
pub use error::{Error, Result};
pub use model::{
    AuditLogRecord, Change, ChangeEvent, Clan, EntityKind, EventType, HistoryCategory, Player,
    Tag, War, WarLogRecord, WarPhase,
};
pub use orchestrator::{DEFAULT_HISTORY_LIMIT, SyncEvent, SyncOrchestrator, SyncPhase};
pub use state::MemoryStorage;
pub use traits::{
    AuditStore, EntityRegistry, EntitySource, SnapshotStore, SourceEvent, Storage, WarLogStore,
};
