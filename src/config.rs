//! Configuration loading and management.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server identity.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Engine tunables (lock policy, aggregator identity, retention).
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Instance name (e.g., "veristate-1").
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path, or ":memory:".
    pub path: String,
}

/// Engine tunables.
///
/// `aggregator_module_id` names the single always-trusted module whose
/// continuous low-trust updates may be silently shadowed by an active lock.
/// All other writers must hold `engine.state.update`.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Module id of the distinguished aggregator.
    #[serde(default = "default_aggregator_module_id")]
    pub aggregator_module_id: String,

    /// When true, `acquire_lock` is conditional: it fails with a lock
    /// conflict instead of overwriting a foreign unexpired lock.
    #[serde(default)]
    pub exclusive_locks: bool,

    /// Lock duration applied when the caller does not supply one.
    #[serde(default = "default_lock_secs")]
    pub default_lock_secs: u64,

    /// Pending messages older than this are purged regardless of status.
    #[serde(default = "default_retention_days")]
    pub mailbox_retention_days: u64,

    /// Interval between retention sweeps in the daemon.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            aggregator_module_id: default_aggregator_module_id(),
            exclusive_locks: false,
            default_lock_secs: default_lock_secs(),
            mailbox_retention_days: default_retention_days(),
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

fn default_aggregator_module_id() -> String {
    "engine.aggregator".to_string()
}

fn default_lock_secs() -> u64 {
    60
}

fn default_retention_days() -> u64 {
    7
}

fn default_purge_interval_secs() -> u64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config: Config = toml::from_str(
            r#"
            [server]
            name = "test-1"

            [database]
            path = ":memory:"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.name, "test-1");
        assert_eq!(config.engine.aggregator_module_id, "engine.aggregator");
        assert!(!config.engine.exclusive_locks);
        assert_eq!(config.engine.default_lock_secs, 60);
        assert_eq!(config.engine.mailbox_retention_days, 7);
    }

    #[test]
    fn test_engine_overrides() {
        let config: Config = toml::from_str(
            r#"
            [server]
            name = "test-1"

            [database]
            path = "data/test.db"

            [engine]
            aggregator_module_id = "mod.aggregator"
            exclusive_locks = true
            default_lock_secs = 15
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.aggregator_module_id, "mod.aggregator");
        assert!(config.engine.exclusive_locks);
        assert_eq!(config.engine.default_lock_secs, 15);
        // Unset keys still get defaults
        assert_eq!(config.engine.purge_interval_secs, 3600);
    }
}
