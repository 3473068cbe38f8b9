//! Module loading and validation.
//!
//! Turns a module file into a ready [`PluginDescriptor`]: parse the manifest,
//! build a brand-new worker, run the module's self-test against it and stamp
//! the descriptor with the file's modification time.

use crate::core::{Error, Result, Timestamp};
use crate::plugin::catalog::WorkerCatalog;
use crate::plugin::interface::{PluginDescriptor, Worker};
use crate::plugin::manifest::{PluginManifest, WorkerSpec};
use crate::plugin::process::ProcessWorker;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Builds plugin descriptors from module files.
#[derive(Clone)]
pub struct PluginLoader {
    /// Built-in implementations available to manifests
    catalog: Arc<WorkerCatalog>,
}

impl PluginLoader {
    /// Create a new loader.
    pub fn new(catalog: WorkerCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
        }
    }

    /// The catalog backing `builtin` manifests.
    pub fn catalog(&self) -> &WorkerCatalog {
        &self.catalog
    }

    /// Load, validate and self-test a module.
    pub fn load(&self, path: &Path) -> Result<PluginDescriptor> {
        let manifest = PluginManifest::load(path)?;
        let worker = self.build_worker(path, &manifest)?;
        self.run_self_test(path, &manifest, worker.as_ref())?;

        let modified_at = modification_time(path)?;
        debug!(
            worker = %manifest.name,
            module = %path.display(),
            %modified_at,
            "module validated"
        );

        Ok(PluginDescriptor::new(
            &manifest.name,
            worker,
            manifest.dependencies.clone(),
            modified_at,
        )
        .with_source(path.to_path_buf())
        .with_description(&manifest.description))
    }

    fn build_worker(&self, path: &Path, manifest: &PluginManifest) -> Result<Arc<dyn Worker>> {
        match &manifest.worker {
            WorkerSpec::Builtin { id } => self
                .catalog
                .build(id)
                .ok_or_else(|| rejected(path, &format!("unknown builtin worker '{}'", id))),
            WorkerSpec::Process {
                command,
                args,
                timeout_secs,
            } => Ok(Arc::new(ProcessWorker::new(
                &manifest.name,
                command.clone(),
                args.clone(),
                *timeout_secs,
            ))),
        }
    }

    fn run_self_test(&self, path: &Path, manifest: &PluginManifest, worker: &dyn Worker) -> Result<()> {
        let inputs = manifest
            .self_test
            .inputs()
            .map_err(|e| rejected(path, &format!("self-test setup failed: {}", e)))?;
        let output = worker
            .execute(&inputs)
            .map_err(|e| rejected(path, &format!("self-test failed: {}", e.message)))?;
        manifest
            .self_test
            .check(&output)
            .map_err(|reason| rejected(path, &format!("self-test failed: {}", reason)))
    }
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self::new(WorkerCatalog::with_builtins())
    }
}

/// On-disk modification time of a module, the staleness authority.
pub fn modification_time(path: &Path) -> Result<Timestamp> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(Timestamp::from(modified))
}

fn rejected(path: &Path, reason: &str) -> Error {
    Error::PluginValidation {
        module: path.display().to_string(),
        reason: reason.to_string(),
    }
}
