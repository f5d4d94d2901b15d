//! Relay Config - executor settings
//!
//! Every field is optional on disk so a project file can override a single
//! value of the global file. Accessors fill in the defaults.

use crate::storage::JsonStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name, both globally and inside the data directory
pub const RELAY_CONFIG_FILE: &str = "config.json";

/// Data directory created inside the working directory
pub const DATA_DIR_NAME: &str = ".relay";

const DEFAULT_MAX_PARALLEL: usize = 1;
const DEFAULT_TASK_TIMEOUT_MS: u64 = 30 * 60 * 1000;
const DEFAULT_MAX_RETRIES: u32 = 15;
const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;
const DEFAULT_DISPATCH_DELAY_MS: u64 = 100;

// ============================================================================
// Relay Config
// ============================================================================

/// Executor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Run several tasks at once (otherwise strictly one at a time)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_execution: Option<bool>,

    /// Upper bound on concurrent tasks when parallel execution is on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,

    /// Per-task timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_timeout: Option<u64>,

    /// Retry budget given to new tasks that don't set one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_max_retries: Option<u32>,

    /// Explicit path of the claude executable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_command: Option<String>,

    /// Scheduler tick in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<u64>,

    /// Pause between two dispatches of the same tick, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_delay: Option<u64>,

    /// Verbose logging
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_mode: Option<bool>,
}

impl RelayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config with every field spelled out, as written by `relay init`
    pub fn with_defaults() -> Self {
        Self {
            parallel_execution: Some(false),
            max_parallel: Some(DEFAULT_MAX_PARALLEL),
            task_timeout: Some(DEFAULT_TASK_TIMEOUT_MS),
            default_max_retries: Some(DEFAULT_MAX_RETRIES),
            claude_command: None,
            poll_interval: Some(DEFAULT_POLL_INTERVAL_MS),
            dispatch_delay: Some(DEFAULT_DISPATCH_DELAY_MS),
            debug_mode: Some(false),
        }
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// Default data directory: `<cwd>/.relay`
    pub fn default_data_dir() -> Result<PathBuf> {
        let cwd = std::env::current_dir().map_err(|e| {
            crate::Error::Config(format!("Cannot get current directory: {}", e))
        })?;
        Ok(cwd.join(DATA_DIR_NAME))
    }

    /// Global + project merged load (project wins)
    pub fn load(data_dir: &Path) -> Result<Self> {
        let mut config = Self::new();

        if let Ok(global) = JsonStore::global() {
            if let Some(global_config) = global.load_optional::<RelayConfig>(RELAY_CONFIG_FILE)? {
                config.merge(global_config);
            }
        }

        config.merge(Self::load_project(data_dir)?);
        Ok(config)
    }

    /// Project file only; missing file yields an empty config
    pub fn load_project(data_dir: &Path) -> Result<Self> {
        let store = JsonStore::new(data_dir);
        Ok(store
            .load_optional::<RelayConfig>(RELAY_CONFIG_FILE)?
            .unwrap_or_default())
    }

    pub fn save_project(&self, data_dir: &Path) -> Result<()> {
        JsonStore::new(data_dir).save(RELAY_CONFIG_FILE, self)
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// Merge another config on top of this one (other wins)
    pub fn merge(&mut self, other: RelayConfig) {
        if other.parallel_execution.is_some() {
            self.parallel_execution = other.parallel_execution;
        }
        if other.max_parallel.is_some() {
            self.max_parallel = other.max_parallel;
        }
        if other.task_timeout.is_some() {
            self.task_timeout = other.task_timeout;
        }
        if other.default_max_retries.is_some() {
            self.default_max_retries = other.default_max_retries;
        }
        if other.claude_command.is_some() {
            self.claude_command = other.claude_command;
        }
        if other.poll_interval.is_some() {
            self.poll_interval = other.poll_interval;
        }
        if other.dispatch_delay.is_some() {
            self.dispatch_delay = other.dispatch_delay;
        }
        if other.debug_mode.is_some() {
            self.debug_mode = other.debug_mode;
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn parallel_execution(&self) -> bool {
        self.parallel_execution.unwrap_or(false)
    }

    /// Never below one
    pub fn max_parallel(&self) -> usize {
        self.max_parallel.unwrap_or(DEFAULT_MAX_PARALLEL).max(1)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout.unwrap_or(DEFAULT_TASK_TIMEOUT_MS))
    }

    /// Never below one
    pub fn default_max_retries(&self) -> u32 {
        self.default_max_retries.unwrap_or(DEFAULT_MAX_RETRIES).max(1)
    }

    pub fn claude_command(&self) -> Option<&str> {
        self.claude_command.as_deref().filter(|c| !c.trim().is_empty())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL_MS).max(1))
    }

    pub fn dispatch_delay(&self) -> Duration {
        Duration::from_millis(self.dispatch_delay.unwrap_or(DEFAULT_DISPATCH_DELAY_MS))
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode.unwrap_or(false)
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn parallel(mut self, max_parallel: usize) -> Self {
        self.parallel_execution = Some(true);
        self.max_parallel = Some(max_parallel);
        self
    }

    pub fn task_timeout_ms(mut self, ms: u64) -> Self {
        self.task_timeout = Some(ms);
        self
    }

    pub fn claude_command_path(mut self, path: impl Into<String>) -> Self {
        self.claude_command = Some(path.into());
        self
    }
}
