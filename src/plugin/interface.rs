//! Worker interface definition.
//!
//! Defines what a worker implementation must provide and what it receives.

use crate::core::Timestamp;
use crate::store::{Sample, SampleSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Pseudo-dependency naming the raw sample.
pub const SAMPLE: &str = "sample";

/// Pseudo-dependency naming a sample set.
pub const SAMPLE_SET: &str = "sample_set";

/// Whether a dependency name refers to stored input rather than a worker.
pub fn is_pseudo_dependency(name: &str) -> bool {
    name == SAMPLE || name == SAMPLE_SET
}

/// Output produced by a worker: a JSON object.
pub type WorkOutput = Map<String, Value>;

/// Result type for worker operations.
pub type PluginResult<T> = std::result::Result<T, PluginError>;

/// Worker-specific error.
#[derive(Clone, Debug)]
pub struct PluginError {
    /// Error message
    pub message: String,
}

impl PluginError {
    /// Create a new error.
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    /// Error for a dependency the worker needs but did not receive.
    pub fn missing_input(name: &str) -> Self {
        Self::new(&format!("missing input: {}", name))
    }
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PluginError: {}", self.message)
    }
}

impl std::error::Error for PluginError {}

/// Combined inputs handed to a worker.
///
/// Every worker dependency contributes its output under its own name, so two
/// dependencies never overwrite each other's keys.
#[derive(Clone, Debug, Default)]
pub struct WorkInputs {
    /// The raw sample, when `sample` is a dependency
    pub sample: Option<Arc<Sample>>,
    /// The sample set, when `sample_set` is a dependency
    pub sample_set: Option<SampleSet>,
    /// Dependency outputs keyed by worker name
    pub outputs: BTreeMap<String, Value>,
}

impl WorkInputs {
    /// Create empty inputs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sample.
    pub fn with_sample(mut self, sample: Sample) -> Self {
        self.sample = Some(Arc::new(sample));
        self
    }

    /// Add a dependency output.
    pub fn with_output(mut self, worker: &str, output: Value) -> Self {
        self.outputs.insert(worker.to_string(), output);
        self
    }

    /// The sample, or an error if it was not supplied.
    pub fn sample(&self) -> PluginResult<&Sample> {
        self.sample
            .as_deref()
            .ok_or_else(|| PluginError::missing_input(SAMPLE))
    }

    /// A dependency output, if present.
    pub fn get(&self, worker: &str) -> Option<&Value> {
        self.outputs.get(worker)
    }

    /// A dependency output, or an error if it was not supplied.
    pub fn require(&self, worker: &str) -> PluginResult<&Value> {
        self.get(worker)
            .ok_or_else(|| PluginError::missing_input(worker))
    }

    /// JSON view, as sent to process workers.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        if let Some(sample) = &self.sample {
            map.insert(SAMPLE.to_string(), sample.to_json());
        }
        if let Some(set) = &self.sample_set {
            map.insert(SAMPLE_SET.to_string(), set.to_json());
        }
        for (name, output) in &self.outputs {
            map.insert(name.clone(), output.clone());
        }
        Value::Object(map)
    }
}

/// A worker implementation.
///
/// Implementations are immutable once registered; a reload builds a new one.
pub trait Worker: Send + Sync {
    /// Compute this worker's output from its combined inputs.
    fn execute(&self, inputs: &WorkInputs) -> PluginResult<WorkOutput>;
}

impl<F> Worker for F
where
    F: Fn(&WorkInputs) -> PluginResult<WorkOutput> + Send + Sync,
{
    fn execute(&self, inputs: &WorkInputs) -> PluginResult<WorkOutput> {
        self(inputs)
    }
}

/// A registered plugin: one immutable implementation plus its metadata.
#[derive(Clone)]
pub struct PluginDescriptor {
    /// Worker name (unique registry key)
    pub name: String,
    /// Implementation
    pub worker: Arc<dyn Worker>,
    /// Declared dependencies, in order
    pub dependencies: Vec<String>,
    /// Code freshness timestamp
    pub modified_at: Timestamp,
    /// Module file the plugin was loaded from
    pub source: Option<PathBuf>,
    /// Description
    pub description: String,
}

impl PluginDescriptor {
    /// Create a new descriptor.
    pub fn new(
        name: &str,
        worker: Arc<dyn Worker>,
        dependencies: Vec<String>,
        modified_at: Timestamp,
    ) -> Self {
        Self {
            name: name.to_string(),
            worker,
            dependencies,
            modified_at,
            source: None,
            description: String::new(),
        }
    }

    /// Set the source module path.
    pub fn with_source(mut self, source: PathBuf) -> Self {
        self.source = Some(source);
        self
    }

    /// Set description.
    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = desc.to_string();
        self
    }

    /// Public metadata.
    pub fn info(&self) -> WorkerInfo {
        WorkerInfo {
            name: self.name.clone(),
            dependencies: self.dependencies.clone(),
            modified_at: self.modified_at,
            description: self.description.clone(),
        }
    }
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("modified_at", &self.modified_at)
            .field("source", &self.source)
            .finish()
    }
}

/// Worker metadata returned to callers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerInfo {
    /// Worker name
    pub name: String,
    /// Declared dependencies
    pub dependencies: Vec<String>,
    /// Code freshness timestamp
    pub modified_at: Timestamp,
    /// Description
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pseudo_dependencies() {
        assert!(is_pseudo_dependency("sample"));
        assert!(is_pseudo_dependency("sample_set"));
        assert!(!is_pseudo_dependency("meta"));
    }

    #[test]
    fn test_inputs_namespacing() {
        let inputs = WorkInputs::new()
            .with_output("a", json!({"x": 1}))
            .with_output("b", json!({"x": 2}));

        let value = inputs.to_json();
        assert_eq!(value["a"]["x"], 1);
        assert_eq!(value["b"]["x"], 2);
    }

    #[test]
    fn test_missing_inputs() {
        let inputs = WorkInputs::new();
        assert!(inputs.sample().is_err());
        assert_eq!(
            inputs.require("meta").unwrap_err().message,
            "missing input: meta"
        );
    }

    #[test]
    fn test_closure_worker() {
        let worker = |inputs: &WorkInputs| -> PluginResult<WorkOutput> {
            let mut out = WorkOutput::new();
            out.insert("length".to_string(), json!(inputs.sample()?.length()));
            Ok(out)
        };
        let inputs = WorkInputs::new().with_sample(Sample::new("a", vec![1, 2, 3], "pe", "c"));
        let output = worker.execute(&inputs).unwrap();
        assert_eq!(output["length"], 3);
    }
}
