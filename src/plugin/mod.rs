//! Plugin Module
//!
//! Provides the hot-reloadable worker plugin architecture:
//! - Worker interface and combined inputs
//! - TOML module manifests with self-tests
//! - Built-in catalog and process-backed workers
//! - Registry with directory watching

pub mod catalog;
pub mod config;
pub mod interface;
pub mod loader;
pub mod manifest;
pub mod process;
pub mod registry;
pub mod watcher;

pub use catalog::{WorkerCatalog, WorkerFactory};
pub use config::PluginConfig;
pub use interface::{
    is_pseudo_dependency, PluginDescriptor, PluginError, PluginResult, WorkInputs, WorkOutput,
    Worker, WorkerInfo, SAMPLE, SAMPLE_SET,
};
pub use loader::{modification_time, PluginLoader};
pub use manifest::{PluginManifest, SelfTest, WorkerSpec};
pub use process::ProcessWorker;
pub use registry::{PluginRegistry, RegistryEvent};
pub use watcher::{PluginWatcher, WatchEvent};
