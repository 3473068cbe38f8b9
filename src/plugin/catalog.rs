//! Catalog of compiled-in worker implementations.
//!
//! Manifests of kind `builtin` name an entry here. Each load calls the
//! factory again, so a reload always yields a fresh implementation value.

use crate::plugin::interface::Worker;
use std::collections::HashMap;
use std::sync::Arc;

/// Factory producing a new worker instance.
pub type WorkerFactory = Arc<dyn Fn() -> Arc<dyn Worker> + Send + Sync>;

/// Built-in worker factories keyed by id.
#[derive(Clone, Default)]
pub struct WorkerCatalog {
    factories: HashMap<String, WorkerFactory>,
}

impl WorkerCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog holding the workers shipped with Workbench.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        crate::workers::register_builtins(&mut catalog);
        catalog
    }

    /// Add or replace a factory.
    pub fn register<F>(&mut self, id: &str, factory: F)
    where
        F: Fn() -> Arc<dyn Worker> + Send + Sync + 'static,
    {
        self.factories.insert(id.to_string(), Arc::new(factory));
    }

    /// Build a new instance of a catalog entry.
    pub fn build(&self, id: &str) -> Option<Arc<dyn Worker>> {
        self.factories.get(id).map(|factory| factory())
    }

    /// Whether an id is known.
    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Known ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.factories.keys().cloned().collect();
        ids.sort();
        ids
    }
}
