//! Eventide configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{EventideError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventideConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EventideConfig {
    /// Load config from the default path (~/.eventide/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EventideError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| EventideError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| EventideError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the scheduler loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        if s.wait_cap_secs == 0 {
            return Err(EventideError::Config("scheduler.wait_cap_secs must be > 0".into()));
        }
        if s.idle_wait_secs == 0 {
            return Err(EventideError::Config("scheduler.idle_wait_secs must be > 0".into()));
        }
        if s.stop_grace_secs == 0 {
            return Err(EventideError::Config("scheduler.stop_grace_secs must be > 0".into()));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Eventide home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".eventide")
    }
}

/// Scheduler loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Longest the loop sleeps before re-reading the queue head.
    #[serde(default = "default_wait_cap_secs")]
    pub wait_cap_secs: u64,
    /// Sleep used while the queue is empty.
    #[serde(default = "default_idle_wait_secs")]
    pub idle_wait_secs: u64,
    /// How long `stop()` waits for the loop before aborting it.
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
    /// Wake the loop as soon as the mutation API changes the queue.
    #[serde(default = "bool_true")]
    pub wake_on_change: bool,
    /// Reload all events from the directory when an idle wait elapses.
    #[serde(default = "bool_true")]
    pub reload_when_idle: bool,
    /// Write back stale statuses found during the cold-start load.
    #[serde(default = "bool_true")]
    pub reconcile_on_initialize: bool,
}

fn bool_true() -> bool { true }
fn default_wait_cap_secs() -> u64 { 60 }
fn default_idle_wait_secs() -> u64 { 300 }
fn default_stop_grace_secs() -> u64 { 10 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            wait_cap_secs: default_wait_cap_secs(),
            idle_wait_secs: default_idle_wait_secs(),
            stop_grace_secs: default_stop_grace_secs(),
            wake_on_change: true,
            reload_when_idle: true,
            reconcile_on_initialize: true,
        }
    }
}

impl SchedulerConfig {
    pub fn wait_cap(&self) -> Duration {
        Duration::from_secs(self.wait_cap_secs)
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_secs(self.idle_wait_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

/// Event database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.eventide/events.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String { "info".into() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
