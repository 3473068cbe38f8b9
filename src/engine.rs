//! Process-scoped Workbench object.
//!
//! Owns the plugin registry, resolver and request service, and the lifecycle
//! of the plugin directory watch. Collaborators are injected; nothing is
//! reached through globals.

use crate::config::WorkbenchConfig;
use crate::core::Result;
use crate::external::{GraphStore, Indexer, MemoryGraph, MemoryIndex};
use crate::plugin::{PluginLoader, PluginRegistry, WorkerCatalog};
use crate::resolver::WorkResolver;
use crate::service::RequestService;
use crate::store::{MemoryResultStore, MemorySampleStore, ResultStore, SampleStore, StoreConfig};
use std::sync::Arc;
use tracing::info;

/// External collaborators a Workbench runs against.
pub struct Collaborators {
    /// Sample and set storage
    pub samples: Arc<dyn SampleStore>,
    /// Result persistence
    pub results: Arc<dyn ResultStore>,
    /// Full-text index
    pub indexer: Arc<dyn Indexer>,
    /// Graph database
    pub graph: Arc<dyn GraphStore>,
    /// Built-in worker implementations available to manifests
    pub catalog: WorkerCatalog,
}

impl Collaborators {
    /// In-memory collaborators with the built-in workers.
    pub fn in_memory(store: &StoreConfig) -> Self {
        Self {
            samples: Arc::new(MemorySampleStore::new(store.clone())),
            results: Arc::new(MemoryResultStore::new()),
            indexer: Arc::new(MemoryIndex::new()),
            graph: Arc::new(MemoryGraph::new()),
            catalog: WorkerCatalog::with_builtins(),
        }
    }

    /// Replace the worker catalog.
    pub fn with_catalog(mut self, catalog: WorkerCatalog) -> Self {
        self.catalog = catalog;
        self
    }
}

/// A running Workbench.
pub struct Workbench {
    /// Configuration
    config: WorkbenchConfig,
    /// Plugin registry
    registry: Arc<PluginRegistry>,
    /// Request service
    service: Arc<RequestService>,
}

impl Workbench {
    /// Start a Workbench with in-memory collaborators.
    pub async fn init(config: WorkbenchConfig) -> Result<Self> {
        let collaborators = Collaborators::in_memory(&config.store);
        Self::init_with(config, collaborators).await
    }

    /// Start a Workbench: load every plugin module, then start watching the
    /// plugin directory if configured to.
    pub async fn init_with(config: WorkbenchConfig, collaborators: Collaborators) -> Result<Self> {
        let registry = Arc::new(PluginRegistry::new(PluginLoader::new(
            collaborators.catalog,
        )));
        let loaded = registry.bootstrap(&config.plugins).await?;

        let resolver = Arc::new(WorkResolver::new(
            registry.clone(),
            collaborators.samples,
            collaborators.results,
            config.resolver.clone(),
        ));
        let service = Arc::new(RequestService::new(
            resolver,
            collaborators.indexer,
            collaborators.graph,
        ));

        info!(
            plugins = loaded,
            dir = %config.plugins.dir.display(),
            watching = config.plugins.watch,
            "workbench initialised"
        );
        Ok(Self {
            config,
            registry,
            service,
        })
    }

    /// Configuration in effect.
    pub fn config(&self) -> &WorkbenchConfig {
        &self.config
    }

    /// The plugin registry.
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// The request service.
    pub fn service(&self) -> &Arc<RequestService> {
        &self.service
    }

    /// Stop the plugin directory watch. Loaded plugins stay usable.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
        info!("workbench shut down");
    }
}
