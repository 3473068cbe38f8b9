//! Plugin registry configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Plugin discovery configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Directory holding plugin modules
    pub dir: PathBuf,
    /// Reload modules when they change on disk
    pub watch: bool,
    /// Debounce window for change notifications (milliseconds)
    pub debounce_ms: u64,
}

impl PluginConfig {
    /// Config for a specific directory.
    pub fn for_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Debounce window.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("workers"),
            watch: true,
            debounce_ms: 500,
        }
    }
}
