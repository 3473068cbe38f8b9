//! Plugin registry for managing workers.
//!
//! Holds the live name → descriptor map, loads modules from the plugin
//! directory, and keeps it current through the directory watcher. Entries
//! are immutable `Arc`s swapped atomically, so a resolution that captured a
//! descriptor keeps using it even if a reload lands mid-call.

use crate::core::{Error, Result, Timestamp};
use crate::plugin::config::PluginConfig;
use crate::plugin::interface::{PluginDescriptor, WorkerInfo};
use crate::plugin::loader::PluginLoader;
use crate::plugin::manifest::is_candidate_module;
use crate::plugin::watcher::PluginWatcher;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Registry notifications.
#[derive(Clone, Debug, PartialEq)]
pub enum RegistryEvent {
    /// A plugin was registered or replaced
    Registered {
        /// Worker name
        name: String,
        /// Code freshness timestamp
        modified_at: Timestamp,
    },
    /// A module failed validation; the registry was not changed
    Rejected {
        /// Module path
        module: String,
        /// Reason
        reason: String,
    },
}

/// Running directory watch.
struct WatchHandle {
    _watcher: PluginWatcher,
    task: JoinHandle<()>,
}

/// Plugin registry.
pub struct PluginRegistry {
    /// Registered plugins
    plugins: RwLock<HashMap<String, Arc<PluginDescriptor>>>,
    /// Module loader
    loader: PluginLoader,
    /// Registration notifications
    events: broadcast::Sender<RegistryEvent>,
    /// Active directory watch, if any
    watch: Mutex<Option<WatchHandle>>,
}

impl PluginRegistry {
    /// Create a new registry.
    pub fn new(loader: PluginLoader) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            plugins: RwLock::new(HashMap::new()),
            loader,
            events,
            watch: Mutex::new(None),
        }
    }

    /// Subscribe to registration notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Register a plugin, replacing any entry with the same name.
    ///
    /// Returns the previous entry, if there was one.
    pub async fn register(&self, descriptor: PluginDescriptor) -> Option<Arc<PluginDescriptor>> {
        let name = descriptor.name.clone();
        let modified_at = descriptor.modified_at;
        let previous = self
            .plugins
            .write()
            .await
            .insert(name.clone(), Arc::new(descriptor));

        info!(
            worker = %name,
            %modified_at,
            replaced = previous.is_some(),
            "plugin loaded"
        );
        let _ = self.events.send(RegistryEvent::Registered { name, modified_at });
        previous
    }

    /// Unregister a plugin.
    pub async fn unregister(&self, name: &str) -> Result<()> {
        match self.plugins.write().await.remove(name) {
            Some(_) => {
                info!(worker = %name, "plugin unregistered");
                Ok(())
            }
            None => Err(Error::UnknownWorker(name.to_string())),
        }
    }

    /// Get plugin by name.
    pub async fn get(&self, name: &str) -> Option<Arc<PluginDescriptor>> {
        self.plugins.read().await.get(name).cloned()
    }

    /// Whether a plugin is registered.
    pub async fn contains(&self, name: &str) -> bool {
        self.plugins.read().await.contains_key(name)
    }

    /// List all plugins, sorted by name.
    pub async fn list(&self) -> Vec<WorkerInfo> {
        let mut infos: Vec<WorkerInfo> = self
            .plugins
            .read()
            .await
            .values()
            .map(|p| p.info())
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Get plugin count.
    pub async fn plugin_count(&self) -> usize {
        self.plugins.read().await.len()
    }

    /// Load a module and register it on success.
    ///
    /// A failed load leaves any existing entry of the same name in place and
    /// reports a diagnostic.
    pub async fn load_module(&self, path: &Path) -> Result<Arc<PluginDescriptor>> {
        let loader = self.loader.clone();
        let owned = path.to_path_buf();
        let loaded = tokio::task::spawn_blocking(move || loader.load(&owned)).await?;

        match loaded {
            Ok(descriptor) => {
                let name = descriptor.name.clone();
                self.register(descriptor).await;
                self.get(&name)
                    .await
                    .ok_or_else(|| Error::Internal(format!("plugin {} vanished after load", name)))
            }
            Err(err) => {
                warn!(module = %path.display(), error = %err, "plugin rejected");
                let reason = match &err {
                    Error::PluginValidation { reason, .. } => reason.clone(),
                    other => other.to_string(),
                };
                let _ = self.events.send(RegistryEvent::Rejected {
                    module: path.display().to_string(),
                    reason,
                });
                Err(err)
            }
        }
    }

    /// Load every existing module in the plugin directory, then start
    /// watching it if configured to.
    ///
    /// Returns the number of modules loaded. Malformed modules are skipped.
    pub async fn bootstrap(self: &Arc<Self>, config: &PluginConfig) -> Result<usize> {
        if !config.dir.is_dir() {
            return Err(Error::Config(format!(
                "plugin directory {} does not exist",
                config.dir.display()
            )));
        }

        let mut loaded = 0;
        for path in candidate_modules(&config.dir)? {
            if self.load_module(&path).await.is_ok() {
                loaded += 1;
            }
        }
        info!(dir = %config.dir.display(), loaded, "plugin bootstrap complete");

        if config.watch {
            self.start_watch(config).await?;
        }
        Ok(loaded)
    }

    async fn start_watch(self: &Arc<Self>, config: &PluginConfig) -> Result<()> {
        let mut watch = self.watch.lock().await;
        if watch.is_some() {
            return Ok(());
        }

        let (watcher, mut rx) = PluginWatcher::start(&config.dir, config.debounce())?;
        let registry: Weak<Self> = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                // Failures are already reported by load_module.
                let _ = registry.load_module(event.path()).await;
            }
        });

        *watch = Some(WatchHandle {
            _watcher: watcher,
            task,
        });
        Ok(())
    }

    /// Whether the directory watch is running.
    pub async fn is_watching(&self) -> bool {
        self.watch.lock().await.is_some()
    }

    /// Stop the directory watch. Registered plugins stay available.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.watch.lock().await.take() {
            handle.task.abort();
            info!("plugin watch stopped");
        }
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new(PluginLoader::default())
    }
}

/// Candidate module files in a directory, sorted by path.
fn candidate_modules(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_candidate_module(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
