// # clansyncd - Clan Sync Daemon
//
// Thin integration layer: all change detection, auditing and war logging
// lives in clansync-core. This binary is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Building the HTTP entity source and the storage backend
// 4. Running the sync orchestrator until SIGTERM/SIGINT
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Source
// - `CLANSYNC_API_BASE_URL`: API base URL (default: https://api.clashofclans.com/v1)
// - `CLANSYNC_API_TOKEN`: Bearer token (required)
// - `CLANSYNC_POLL_INTERVAL_SECS`: Polling interval in seconds
// - `CLANSYNC_REQUEST_TIMEOUT_SECS`: Per-request timeout in seconds
//
// ### Storage
// - `CLANSYNC_STORAGE_TYPE`: Storage backend (sqlite, memory)
// - `CLANSYNC_DB_PATH`: Path to the database file (for sqlite)
//
// ### Audit
// - `CLANSYNC_AUDIT_BATCH_SIZE`: Queue length that triggers a flush
// - `CLANSYNC_AUDIT_FLUSH_INTERVAL_SECS`: Maximum age of a queued record
//
// ### Orchestrator
// - `CLANSYNC_DISCOVERY_INTERVAL_SECS`: Interval between discovery passes
// - `CLANSYNC_REGISTER_JOINED_MEMBERS`: Register players seen joining (true, false)
// - `CLANSYNC_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export CLANSYNC_API_TOKEN=eyJ0eXAiOiJKV1Qi...
// export CLANSYNC_STORAGE_TYPE=sqlite
// export CLANSYNC_DB_PATH=/var/lib/clansync/clansync.db
//
// clansyncd
// ```

use anyhow::Result;
use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use clansync_core::config::default_base_url;
use clansync_core::{
    AuditConfig, EntitySource, MemoryStorage, OrchestratorConfig, SourceConfig, Storage,
    StorageConfig, SyncConfig, SyncEvent, SyncOrchestrator,
};
use clansync_source_http::HttpEntitySource;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClansyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<ClansyncExitCode> for ExitCode {
    fn from(code: ClansyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    api_base_url: String,
    api_token: String,
    poll_interval_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    storage_type: String,
    db_path: Option<String>,
    audit_batch_size: Option<usize>,
    audit_flush_interval_secs: Option<u64>,
    discovery_interval_secs: Option<u64>,
    register_joined_members: Option<bool>,
    log_level: String,
}

/// Read an optional variable, rejecting values that do not parse
fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {:?}", name, raw)),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            api_base_url: env::var("CLANSYNC_API_BASE_URL").unwrap_or_else(|_| default_base_url()),
            api_token: env::var("CLANSYNC_API_TOKEN").unwrap_or_default(),
            poll_interval_secs: parse_env("CLANSYNC_POLL_INTERVAL_SECS")?,
            request_timeout_secs: parse_env("CLANSYNC_REQUEST_TIMEOUT_SECS")?,
            storage_type: env::var("CLANSYNC_STORAGE_TYPE")
                .unwrap_or_else(|_| "sqlite".to_string()),
            db_path: env::var("CLANSYNC_DB_PATH").ok(),
            audit_batch_size: parse_env("CLANSYNC_AUDIT_BATCH_SIZE")?,
            audit_flush_interval_secs: parse_env("CLANSYNC_AUDIT_FLUSH_INTERVAL_SECS")?,
            discovery_interval_secs: parse_env("CLANSYNC_DISCOVERY_INTERVAL_SECS")?,
            register_joined_members: parse_env("CLANSYNC_REGISTER_JOINED_MEMBERS")?,
            log_level: env::var("CLANSYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.api_token.is_empty() {
            anyhow::bail!(
                "CLANSYNC_API_TOKEN is required. \
                Set it via: export CLANSYNC_API_TOKEN=your_token"
            );
        }

        let token_lower = self.api_token.to_lowercase();
        if token_lower.contains("your_token")
            || token_lower.contains("replace_me")
            || token_lower == "token"
        {
            anyhow::bail!(
                "CLANSYNC_API_TOKEN appears to be a placeholder. \
                Use a token from the developer portal."
            );
        }

        if !self.api_base_url.starts_with("https://") && !self.api_base_url.starts_with("http://") {
            anyhow::bail!(
                "CLANSYNC_API_BASE_URL must use HTTP or HTTPS scheme. Got: {}",
                self.api_base_url
            );
        }

        match self.storage_type.as_str() {
            "sqlite" => match &self.db_path {
                Some(path) if !path.is_empty() => {
                    if let Some(parent) = std::path::Path::new(path).parent()
                        && !parent.as_os_str().is_empty()
                        && !parent.exists()
                    {
                        anyhow::bail!(
                            "CLANSYNC_DB_PATH parent directory does not exist: {}. \
                            Create it first: mkdir -p {}",
                            parent.display(),
                            parent.display()
                        );
                    }
                }
                _ => anyhow::bail!(
                    "CLANSYNC_DB_PATH is required when CLANSYNC_STORAGE_TYPE=sqlite. \
                    Set it via: export CLANSYNC_DB_PATH=/var/lib/clansync/clansync.db"
                ),
            },
            "memory" => {}
            other => anyhow::bail!(
                "CLANSYNC_STORAGE_TYPE '{}' is not supported. \
                Supported types: sqlite, memory",
                other
            ),
        }

        if let Some(interval) = self.poll_interval_secs
            && !(5..=3600).contains(&interval)
        {
            anyhow::bail!(
                "CLANSYNC_POLL_INTERVAL_SECS must be between 5 and 3600 seconds. Got: {}",
                interval
            );
        }

        if let Some(timeout) = self.request_timeout_secs
            && !(1..=120).contains(&timeout)
        {
            anyhow::bail!(
                "CLANSYNC_REQUEST_TIMEOUT_SECS must be between 1 and 120 seconds. Got: {}",
                timeout
            );
        }

        if let Some(batch_size) = self.audit_batch_size
            && !(1..=10_000).contains(&batch_size)
        {
            anyhow::bail!(
                "CLANSYNC_AUDIT_BATCH_SIZE must be between 1 and 10000. Got: {}",
                batch_size
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "CLANSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Build the core configuration, filling unset values with defaults
    fn to_sync_config(&self) -> SyncConfig {
        let mut config = SyncConfig::new();

        config.source = SourceConfig::Http {
            base_url: self.api_base_url.clone(),
            api_token: self.api_token.clone(),
            poll_interval_secs: self.poll_interval_secs.unwrap_or(60),
            request_timeout_secs: self.request_timeout_secs.unwrap_or(5),
        };

        config.storage = match (self.storage_type.as_str(), &self.db_path) {
            ("sqlite", Some(path)) => StorageConfig::Sqlite { path: path.clone() },
            _ => StorageConfig::Memory,
        };

        let audit_defaults = AuditConfig::default();
        config.audit = AuditConfig {
            batch_size: self.audit_batch_size.unwrap_or(audit_defaults.batch_size),
            flush_interval_secs: self
                .audit_flush_interval_secs
                .unwrap_or(audit_defaults.flush_interval_secs),
            ..audit_defaults
        };

        let orchestrator_defaults = OrchestratorConfig::default();
        config.orchestrator = OrchestratorConfig {
            discovery_interval_secs: self
                .discovery_interval_secs
                .unwrap_or(orchestrator_defaults.discovery_interval_secs),
            register_joined_members: self
                .register_joined_members
                .unwrap_or(orchestrator_defaults.register_joined_members),
            ..orchestrator_defaults
        };

        config
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ClansyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return ClansyncExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ClansyncExitCode::ConfigError.into();
    }

    info!("Starting clansyncd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ClansyncExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run_daemon(config)).into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> ClansyncExitCode {
    let sync_config = config.to_sync_config();

    let source = match HttpEntitySource::from_config(&sync_config.source) {
        Ok(source) => Arc::new(source) as Arc<dyn EntitySource>,
        Err(e) => {
            error!("Failed to create entity source: {}", e);
            return ClansyncExitCode::ConfigError;
        }
    };

    let storage = match open_storage(&sync_config.storage).await {
        Ok(storage) => storage,
        Err(e) => {
            error!("Failed to open storage: {}", e);
            return ClansyncExitCode::ConfigError;
        }
    };

    let (orchestrator, events) = match SyncOrchestrator::new(source, storage, sync_config) {
        Ok(pair) => pair,
        Err(e) => {
            error!("Failed to create orchestrator: {}", e);
            return ClansyncExitCode::ConfigError;
        }
    };

    tokio::spawn(log_sync_events(events));

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => info!("Received shutdown signal: {}", signal),
            Err(e) => error!("Signal handling failed, shutting down: {}", e),
        }
        let _ = shutdown_tx.send(());
    });

    match orchestrator.run_with_shutdown(Some(shutdown_rx)).await {
        Ok(()) => {
            info!("Daemon stopped");
            ClansyncExitCode::CleanShutdown
        }
        Err(e @ clansync_core::Error::Authentication(_)) => {
            error!("Startup failed: {}", e);
            ClansyncExitCode::ConfigError
        }
        Err(e) => {
            error!("Daemon error: {}", e);
            ClansyncExitCode::RuntimeError
        }
    }
}

/// Open the configured storage backend
async fn open_storage(config: &StorageConfig) -> Result<Storage> {
    match config {
        #[cfg(feature = "sqlite")]
        StorageConfig::Sqlite { path } => {
            info!("Opening SQLite database at {}", path);
            let store = clansync_store_sqlite::SqliteStore::open(path).await?;
            Ok(Storage::from_backend(Arc::new(store)))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageConfig::Sqlite { .. } => {
            anyhow::bail!("clansyncd was built without SQLite support")
        }
        StorageConfig::Memory => {
            warn!("Using in-memory storage; nothing survives a restart");
            Ok(Storage::from_backend(Arc::new(MemoryStorage::new())))
        }
    }
}

/// Log the orchestrator's monitoring events
async fn log_sync_events(mut events: mpsc::Receiver<SyncEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SyncEvent::Started { clans, players } => {
                info!("Tracking {} clan(s) and {} player(s)", clans, players)
            }
            SyncEvent::FlushFailed { error } => warn!("Final audit flush failed: {}", error),
            SyncEvent::Stopped { reason } => info!("Sync stopped: {}", reason),
            other => tracing::debug!("Sync event: {:?}", other),
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
