use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Bound on each notification queue.
pub const NOTIFICATION_QUEUE_MAX: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Capacity of the heap notification queue.
    pub queue_capacity: usize,
    /// Whether EndOfGC notifications are produced. Togglable at runtime.
    pub gc_notifications: bool,
    pub dlpar: DlparConfig,
    pub thread_names: ThreadNames,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DlparConfig {
    pub enabled: bool,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadNames {
    pub heap: String,
    pub dlpar: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: NOTIFICATION_QUEUE_MAX,
            gc_notifications: true,
            dlpar: DlparConfig::default(),
            thread_names: ThreadNames::default(),
        }
    }
}

impl Default for DlparConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: NOTIFICATION_QUEUE_MAX,
        }
    }
}

impl Default for ThreadNames {
    fn default() -> Self {
        Self {
            heap: "mem-notifier".to_string(),
            dlpar: "dlpar-notifier".to_string(),
        }
    }
}

impl TelemetryConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be at least 1".into()));
        }
        if self.dlpar.queue_capacity == 0 {
            return Err(ConfigError::Invalid("dlpar.queue_capacity must be at least 1".into()));
        }
        if self.thread_names.heap.is_empty() || self.thread_names.dlpar.is_empty() {
            return Err(ConfigError::Invalid("dispatcher thread names must not be empty".into()));
        }
        if self.thread_names.heap.contains('\0') || self.thread_names.dlpar.contains('\0') {
            return Err(ConfigError::Invalid("dispatcher thread names must not contain NUL".into()));
        }
        Ok(())
    }
}
