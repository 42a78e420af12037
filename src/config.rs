//! Configuration
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or no file at all) yields a working setup. Command-line flags in the
//! binary override individual values afterwards.

use crate::error::{Result, SchedulerError};
use crate::scheduler::supervisor::RestartPolicy;
use crate::scheduler::types::DEFAULT_MAX_RETRIES;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration for the binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP listen address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// How often the stats reporter logs scheduler counters.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_bind() -> String {
    "127.0.0.1:9000".into()
}
fn default_stats_interval_secs() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            stats_interval_secs: default_stats_interval_secs(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads a config file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| SchedulerError::Config(format!("Failed to parse config: {e}")))
    }
}

/// Settings of the scheduling core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Size of the worker pool. Zero is allowed; submissions then wait in the
    /// pending queue.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Retry budget given to newly submitted tasks.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Restarts allowed per worker slot inside `restart_window_secs`.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    #[serde(default = "default_restart_window_secs")]
    pub restart_window_secs: u64,
    /// Buffer of the completion event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_worker_count() -> usize {
    5
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_max_restarts() -> u32 {
    10
}
fn default_restart_window_secs() -> u64 {
    60
}
fn default_event_capacity() -> usize {
    256
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            max_retries: default_max_retries(),
            max_restarts: default_max_restarts(),
            restart_window_secs: default_restart_window_secs(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl SchedulerConfig {
    /// Default settings with a specific pool size.
    pub fn with_workers(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Self::default()
        }
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy {
            max_restarts: self.max_restarts,
            within: Duration::from_secs(self.restart_window_secs),
        }
    }
}
