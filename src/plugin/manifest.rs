//! Plugin module manifests.
//!
//! A module is a TOML file in the plugin directory declaring exactly one
//! worker, its dependency list and a self-test. Manifests are validated
//! before anything is built from them, so a rejected module never touches
//! the registry.

use crate::core::{Error, Result};
use crate::plugin::interface::{is_pseudo_dependency, WorkInputs, WorkOutput};
use crate::store::Sample;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// File extension of candidate modules.
pub const MODULE_EXTENSION: &str = "toml";

/// Default process worker timeout (seconds).
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Whether a path looks like a plugin module.
pub fn is_candidate_module(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(MODULE_EXTENSION)
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| !name.starts_with('.'))
            .unwrap_or(false)
}

/// Declared worker implementation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerSpec {
    /// Compiled-in implementation looked up in the worker catalog
    Builtin {
        /// Catalog id
        id: String,
    },
    /// External executable speaking one JSON line in, one JSON line out
    Process {
        /// Absolute path of the executable
        command: PathBuf,
        /// Extra arguments
        #[serde(default)]
        args: Vec<String>,
        /// Execution timeout
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Sample fixture used by a self-test.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelfTestSample {
    /// Filename
    #[serde(default = "default_fixture_filename")]
    pub filename: String,
    /// Type tag
    #[serde(default = "default_fixture_type")]
    pub type_tag: String,
    /// Content as UTF-8 text
    pub text: Option<String>,
    /// Content as base64
    pub base64: Option<String>,
}

fn default_fixture_filename() -> String {
    "self_test".to_string()
}

fn default_fixture_type() -> String {
    "text".to_string()
}

/// Top-level self-test entry point of a module.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelfTest {
    /// Sample fixture
    pub sample: Option<SelfTestSample>,
    /// Dependency outputs keyed by worker name
    #[serde(default)]
    pub inputs: toml::Table,
    /// Key/value pairs the output must contain
    #[serde(default)]
    pub expect: toml::Table,
}

impl SelfTest {
    /// Build the inputs the self-test runs against.
    pub fn inputs(&self) -> Result<WorkInputs> {
        let mut inputs = WorkInputs::new();

        if let Some(fixture) = &self.sample {
            let bytes = match (&fixture.text, &fixture.base64) {
                (Some(text), None) => text.as_bytes().to_vec(),
                (None, Some(encoded)) => STANDARD.decode(encoded).map_err(|e| {
                    Error::Config(format!("self_test sample is not valid base64: {}", e))
                })?,
                (None, None) => Vec::new(),
                (Some(_), Some(_)) => {
                    return Err(Error::Config(
                        "self_test sample must set only one of text or base64".to_string(),
                    ))
                }
            };
            inputs = inputs.with_sample(Sample::new(
                &fixture.filename,
                bytes,
                &fixture.type_tag,
                "self_test",
            ));
        }

        for (name, value) in &self.inputs {
            inputs = inputs.with_output(name, serde_json::to_value(value)?);
        }
        Ok(inputs)
    }

    /// Check an output against the expected key/value pairs.
    pub fn check(&self, output: &WorkOutput) -> std::result::Result<(), String> {
        let expected: Map<String, Value> = match serde_json::to_value(&self.expect) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(e) => return Err(e.to_string()),
        };

        for (key, want) in expected {
            match output.get(&key) {
                Some(got) if json_eq(got, &want) => {}
                Some(got) => {
                    return Err(format!("expected {} = {}, got {}", key, want, got));
                }
                None => return Err(format!("expected key {} missing from output", key)),
            }
        }
        Ok(())
    }
}

/// Compare JSON values, treating integer and float representations alike.
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

/// Raw manifest as written on disk.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    name: Option<String>,
    #[serde(default)]
    description: String,
    dependencies: Vec<String>,
    #[serde(default)]
    worker: Vec<WorkerSpec>,
    self_test: Option<SelfTest>,
}

/// A validated plugin manifest.
#[derive(Clone, Debug)]
pub struct PluginManifest {
    /// Worker name
    pub name: String,
    /// Description
    pub description: String,
    /// Declared dependencies, in order
    pub dependencies: Vec<String>,
    /// The single worker implementation
    pub worker: WorkerSpec,
    /// Self-test entry point
    pub self_test: SelfTest,
}

impl PluginManifest {
    /// Read and validate a module file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| rejected(path, &e.to_string()))?;
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();
        Self::parse(&text, stem).map_err(|reason| rejected(path, &reason))
    }

    /// Parse and validate manifest text; `default_name` applies when the
    /// manifest does not name itself.
    pub fn parse(text: &str, default_name: &str) -> std::result::Result<Self, String> {
        let raw: RawManifest = toml::from_str(text).map_err(|e| e.message().to_string())?;

        let name = raw.name.unwrap_or_else(|| default_name.to_string());
        if name.trim().is_empty() {
            return Err("worker name must not be empty".to_string());
        }
        if is_pseudo_dependency(&name) {
            return Err(format!("worker name '{}' is reserved", name));
        }

        let mut workers = raw.worker;
        if workers.len() != 1 {
            return Err(format!(
                "module must declare exactly one worker, found {}",
                workers.len()
            ));
        }
        let worker = workers.remove(0);

        let self_test = raw
            .self_test
            .ok_or_else(|| "module must provide a [self_test] entry point".to_string())?;

        for dep in &raw.dependencies {
            if dep.trim().is_empty() {
                return Err("dependency names must not be empty".to_string());
            }
            if *dep == name {
                return Err(format!("worker {} depends on itself", name));
            }
        }

        if let WorkerSpec::Process { command, .. } = &worker {
            if !command.is_absolute() {
                return Err(format!(
                    "process command must be an absolute path, got '{}'",
                    command.display()
                ));
            }
        }

        Ok(Self {
            name,
            description: raw.description,
            dependencies: raw.dependencies,
            worker,
            self_test,
        })
    }
}

fn rejected(path: &Path, reason: &str) -> Error {
    Error::PluginValidation {
        module: path.display().to_string(),
        reason: reason.to_string(),
    }
}
