//! Storage configuration.

use serde::{Deserialize, Serialize};

/// Sample storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Customer tag assigned to newly stored samples
    pub default_customer: String,
    /// Total sample bytes kept before the oldest samples are evicted (MB)
    pub samples_cap_mb: Option<u64>,
}

impl StoreConfig {
    /// Sample cap in bytes, if any.
    pub fn samples_cap_bytes(&self) -> Option<u64> {
        self.samples_cap_mb.map(|mb| mb * 1024 * 1024)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_customer: "Unknown".to_string(),
            samples_cap_mb: None,
        }
    }
}
