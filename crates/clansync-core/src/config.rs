//! Configuration types for the clan sync system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Remote entity source configuration
    pub source: SourceConfig,

    /// Storage backend configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Audit batching settings
    #[serde(default)]
    pub audit: AuditConfig,

    /// Orchestrator settings
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl SyncConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            source: SourceConfig::default(),
            storage: StorageConfig::default(),
            audit: AuditConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.source.validate()?;
        self.storage.validate()?;
        self.audit.validate()?;
        self.orchestrator.validate()?;

        if self.orchestrator.discovery_interval_secs <= self.audit.flush_interval_secs {
            return Err(crate::Error::config(format!(
                "Discovery interval ({}s) must be longer than the audit flush interval ({}s)",
                self.orchestrator.discovery_interval_secs, self.audit.flush_interval_secs
            )));
        }

        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Remote entity source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Polling client for the public game API
    Http {
        /// API base URL (e.g., "https://api.clashofclans.com/v1")
        base_url: String,
        /// Bearer token issued by the developer portal
        api_token: String,
        /// Interval between polling rounds in seconds
        #[serde(default = "default_poll_interval_secs")]
        poll_interval_secs: u64,
        /// Per-request timeout in seconds
        #[serde(default = "default_request_timeout_secs")]
        request_timeout_secs: u64,
    },

    /// Custom entity source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl SourceConfig {
    /// Validate the source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SourceConfig::Http {
                base_url,
                api_token,
                poll_interval_secs,
                request_timeout_secs,
            } => {
                if base_url.is_empty() {
                    return Err(crate::Error::config("Source base URL cannot be empty"));
                }
                if api_token.is_empty() {
                    return Err(crate::Error::config("Source API token cannot be empty"));
                }
                if *poll_interval_secs == 0 {
                    return Err(crate::Error::config("Poll interval must be > 0"));
                }
                if *request_timeout_secs == 0 {
                    return Err(crate::Error::config("Request timeout must be > 0"));
                }
                Ok(())
            }
            SourceConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom source factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom source config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the source type name
    pub fn type_name(&self) -> &str {
        match self {
            SourceConfig::Http { .. } => "http",
            SourceConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Http {
            base_url: default_base_url(),
            api_token: String::new(),
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    /// SQLite database file
    Sqlite {
        /// Path to the database file
        path: String,
    },

    /// In-memory storage (not persistent)
    #[default]
    Memory,
}

impl StorageConfig {
    /// Validate the storage configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StorageConfig::Sqlite { path } if path.is_empty() => {
                Err(crate::Error::config("SQLite database path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Audit batching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Queue length that triggers an immediate flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum time a record waits in the queue before a flush (in seconds)
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Upper bound on the final flush performed at shutdown (in seconds)
    #[serde(default = "default_shutdown_flush_timeout_secs")]
    pub shutdown_flush_timeout_secs: u64,
}

impl AuditConfig {
    /// Validate the audit configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.batch_size == 0 {
            return Err(crate::Error::config("Audit batch size must be > 0"));
        }
        if self.flush_interval_secs == 0 {
            return Err(crate::Error::config("Audit flush interval must be > 0"));
        }
        Ok(())
    }

    /// Flush interval as a [`Duration`]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// Shutdown flush timeout as a [`Duration`]
    pub fn shutdown_flush_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_flush_timeout_secs)
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_secs: default_flush_interval_secs(),
            shutdown_flush_timeout_secs: default_shutdown_flush_timeout_secs(),
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Interval between discovery passes for newly tracked entities (in seconds)
    #[serde(default = "default_discovery_interval_secs")]
    pub discovery_interval_secs: u64,

    /// Capacity of the monitoring event channel
    ///
    /// When full, new sync events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Register players seen joining a clan or fighting in its wars
    #[serde(default = "default_register_joined_members")]
    pub register_joined_members: bool,
}

impl OrchestratorConfig {
    /// Validate the orchestrator configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.discovery_interval_secs == 0 {
            return Err(crate::Error::config("Discovery interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }

    /// Discovery interval as a [`Duration`]
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            discovery_interval_secs: default_discovery_interval_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            register_joined_members: default_register_joined_members(),
        }
    }
}

/// Default API base URL
pub fn default_base_url() -> String {
    "https://api.clashofclans.com/v1".to_string()
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_batch_size() -> usize {
    10
}

fn default_flush_interval_secs() -> u64 {
    60
}

fn default_shutdown_flush_timeout_secs() -> u64 {
    5
}

fn default_discovery_interval_secs() -> u64 {
    300
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_register_joined_members() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SyncConfig::default();
        assert_eq!(config.audit.batch_size, 10);
        assert_eq!(config.audit.flush_interval(), Duration::from_secs(60));
        assert_eq!(config.orchestrator.discovery_interval(), Duration::from_secs(300));
        assert!(config.orchestrator.register_joined_members);
    }

    #[test]
    fn empty_token_is_rejected() {
        let config = SyncConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn tagged_config_deserializes() {
        let json = r#"{
            "source": { "type": "http", "base_url": "http://localhost", "api_token": "t" },
            "storage": { "type": "sqlite", "path": "/tmp/clansync.db" },
            "audit": { "batch_size": 3 }
        }"#;
        let config: SyncConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.audit.batch_size, 3);
        assert_eq!(config.audit.flush_interval_secs, 60);
        assert_eq!(config.source.type_name(), "http");
        assert!(matches!(config.storage, StorageConfig::Sqlite { .. }));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut config = SyncConfig::default();
        if let SourceConfig::Http { api_token, .. } = &mut config.source {
            *api_token = "token".into();
        }
        config.audit.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn discovery_must_be_coarser_than_flush() {
        let mut config = SyncConfig::default();
        if let SourceConfig::Http { api_token, .. } = &mut config.source {
            *api_token = "token".into();
        }
        assert!(config.validate().is_ok());

        config.orchestrator.discovery_interval_secs = 60;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }
}
