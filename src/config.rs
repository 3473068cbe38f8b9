//! Workbench configuration.
//!
//! Loaded from a TOML file. Every section and field is optional and falls
//! back to its default.
//!
//! ```toml
//! [plugins]
//! dir = "workers"
//! watch = true
//! debounce_ms = 500
//!
//! [resolver]
//! single_flight = false
//! isolate_execution = false
//!
//! [store]
//! default_customer = "Unknown"
//! samples_cap_mb = 2048
//!
//! [server]
//! listen = "127.0.0.1:4242"
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```

use crate::core::{Error, Result};
use crate::monitoring::LoggingConfig;
use crate::plugin::PluginConfig;
use crate::resolver::ResolverConfig;
use crate::server::ServerConfig;
use crate::store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete Workbench configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkbenchConfig {
    /// Plugin discovery
    pub plugins: PluginConfig,
    /// Work resolver
    pub resolver: ResolverConfig,
    /// Sample storage
    pub store: StoreConfig,
    /// Network transport
    pub server: ServerConfig,
    /// Logging
    pub logging: LoggingConfig,
}

impl WorkbenchConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
