//! Recursive dependency resolution with staleness-aware caching.

use crate::core::{now, Error, Result};
use crate::monitoring::metrics::{ResolverMetrics, ResolverStats};
use crate::plugin::interface::{PluginDescriptor, WorkInputs, WorkOutput, SAMPLE, SAMPLE_SET};
use crate::plugin::registry::PluginRegistry;
use crate::resolver::config::ResolverConfig;
use crate::resolver::flight::FlightLocks;
use crate::resolver::result::WorkResult;
use crate::resolver::subkeys;
use crate::store::{ResultStore, Sample, SampleSet, SampleStore};
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// What one dependency contributes to a worker's inputs.
#[derive(Clone, Debug)]
pub enum Contribution {
    /// The raw sample
    Sample(Arc<Sample>),
    /// A sample set
    SampleSet(SampleSet),
    /// A worker's result
    Output(Arc<WorkResult>),
    /// Soft miss: nothing
    Empty,
}

impl Contribution {
    /// JSON view returned to callers.
    pub fn to_value(&self) -> Value {
        match self {
            Contribution::Sample(sample) => sample.to_json(),
            Contribution::SampleSet(set) => set.to_json(),
            Contribution::Output(result) => Value::Object(result.output.clone()),
            Contribution::Empty => Value::Object(WorkOutput::new()),
        }
    }

    fn add_to(self, dependency: &str, inputs: &mut WorkInputs) {
        match self {
            Contribution::Sample(sample) => inputs.sample = Some(sample),
            Contribution::SampleSet(set) => inputs.sample_set = Some(set),
            Contribution::Output(result) => {
                inputs
                    .outputs
                    .insert(dependency.to_string(), Value::Object(result.output.clone()));
            }
            Contribution::Empty => {}
        }
    }
}

/// Resolves worker outputs, recomputing only stale or missing results.
pub struct WorkResolver {
    /// Live plugins
    registry: Arc<PluginRegistry>,
    /// Sample and set collaborator
    samples: Arc<dyn SampleStore>,
    /// Result persistence collaborator
    results: Arc<dyn ResultStore>,
    /// Configuration
    config: ResolverConfig,
    /// Per-key locks, used when single-flight is on
    flights: FlightLocks,
    /// Counters
    metrics: ResolverMetrics,
}

impl WorkResolver {
    /// Create a new resolver.
    pub fn new(
        registry: Arc<PluginRegistry>,
        samples: Arc<dyn SampleStore>,
        results: Arc<dyn ResultStore>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            registry,
            samples,
            results,
            config,
            flights: FlightLocks::new(),
            metrics: ResolverMetrics::new(),
        }
    }

    /// The plugin registry.
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// The sample collaborator.
    pub fn samples(&self) -> &Arc<dyn SampleStore> {
        &self.samples
    }

    /// The result collaborator.
    pub fn results(&self) -> &Arc<dyn ResultStore> {
        &self.results
    }

    /// Counter snapshot.
    pub fn stats(&self) -> ResolverStats {
        self.metrics.snapshot()
    }

    /// Resolve a worker's output for a sample.
    ///
    /// `sample` and `sample_set` return the stored record. An unregistered
    /// worker yields an empty object. With `subkeys`, the result is narrowed
    /// to an object keyed by each dotted path.
    pub async fn resolve(
        &self,
        worker: &str,
        sample_id: &str,
        subkeys: Option<&[String]>,
    ) -> Result<Value> {
        let contribution = self.resolve_node(worker, sample_id, Vec::new()).await?;
        let value = contribution.to_value();
        match subkeys {
            Some(paths) if !paths.is_empty() => subkeys::extract(&value, paths),
            _ => Ok(value),
        }
    }

    /// Resolve one node of the dependency tree.
    ///
    /// `path` holds the workers above this node, for cycle detection.
    pub fn resolve_node<'a>(
        &'a self,
        worker: &'a str,
        sample_id: &'a str,
        path: Vec<String>,
    ) -> BoxFuture<'a, Result<Contribution>> {
        Box::pin(async move {
            match worker {
                SAMPLE => return self.fetch_sample(sample_id).await,
                SAMPLE_SET => {
                    let set = self.samples.get_sample_set(sample_id).await?;
                    return Ok(Contribution::SampleSet(set));
                }
                _ => {}
            }

            if path.iter().any(|seen| seen == worker) {
                let mut chain = path.join(" -> ");
                chain.push_str(" -> ");
                chain.push_str(worker);
                return Err(Error::DependencyCycle(chain));
            }

            // Captured once; a reload during this call does not affect it.
            let Some(plugin) = self.registry.get(worker).await else {
                warn!(worker = %worker, sample = %sample_id, "unknown worker, contributing nothing");
                self.metrics.soft_misses.inc();
                return Ok(Contribution::Empty);
            };

            if let Some(cached) = self.cached(&plugin, sample_id).await? {
                return Ok(Contribution::Output(cached));
            }

            let _flight = if self.config.single_flight {
                let guard = self.flights.acquire(worker, sample_id).await;
                // Another caller may have finished the work while we waited.
                if let Some(cached) = self.cached(&plugin, sample_id).await? {
                    return Ok(Contribution::Output(cached));
                }
                Some(guard)
            } else {
                None
            };

            let mut path = path;
            path.push(worker.to_string());
            let result = self.compute(plugin, sample_id, path).await?;
            Ok(Contribution::Output(result))
        })
    }

    /// A sample, falling back to a sample set with the same id.
    async fn fetch_sample(&self, sample_id: &str) -> Result<Contribution> {
        match self.samples.get_sample(sample_id).await {
            Ok(sample) => Ok(Contribution::Sample(sample)),
            Err(Error::NotFound { .. }) => match self.samples.get_sample_set(sample_id).await {
                Ok(set) => Ok(Contribution::SampleSet(set)),
                Err(Error::NotFound { .. }) => Err(Error::sample_not_found(sample_id)),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// The stored result, if present and fresh.
    async fn cached(
        &self,
        plugin: &PluginDescriptor,
        sample_id: &str,
    ) -> Result<Option<Arc<WorkResult>>> {
        let Some(payload) = self.results.get_result(&plugin.name, sample_id).await? else {
            debug!(worker = %plugin.name, sample = %sample_id, "cache miss");
            return Ok(None);
        };

        let Some(result) = WorkResult::from_payload(&plugin.name, sample_id, payload) else {
            warn!(worker = %plugin.name, sample = %sample_id, "unreadable cached result, recomputing");
            return Ok(None);
        };

        if result.is_fresh(plugin.modified_at) {
            debug!(worker = %plugin.name, sample = %sample_id, "cache hit");
            self.metrics.cache_hits.inc();
            Ok(Some(Arc::new(result)))
        } else {
            debug!(
                worker = %plugin.name,
                sample = %sample_id,
                computed_at = %result.computed_at,
                modified_at = %plugin.modified_at,
                "stale cached result"
            );
            Ok(None)
        }
    }

    /// Resolve dependencies in declared order, execute, and persist.
    async fn compute(
        &self,
        plugin: Arc<PluginDescriptor>,
        sample_id: &str,
        path: Vec<String>,
    ) -> Result<Arc<WorkResult>> {
        let mut inputs = WorkInputs::new();
        for dependency in &plugin.dependencies {
            self.resolve_node(dependency, sample_id, path.clone())
                .await?
                .add_to(dependency, &mut inputs);
        }

        self.metrics.executions.inc();
        let output = match self.execute(&plugin, inputs).await {
            Ok(output) => output,
            Err(message) => {
                self.metrics.failures.inc();
                warn!(worker = %plugin.name, sample = %sample_id, error = %message, "worker failed");
                return Err(Error::PluginExecution {
                    worker: plugin.name.clone(),
                    sample: sample_id.to_string(),
                    message,
                });
            }
        };

        let result = WorkResult::new(&plugin.name, sample_id, now(), output);
        self.results
            .store_result(&plugin.name, sample_id, result.to_payload())
            .await?;
        debug!(worker = %plugin.name, sample = %sample_id, "stored result");
        Ok(Arc::new(result))
    }

    async fn execute(
        &self,
        plugin: &Arc<PluginDescriptor>,
        inputs: WorkInputs,
    ) -> std::result::Result<WorkOutput, String> {
        if self.config.isolate_execution {
            let plugin = plugin.clone();
            match tokio::task::spawn_blocking(move || plugin.worker.execute(&inputs)).await {
                Ok(outcome) => outcome.map_err(|e| e.message),
                Err(join) => Err(format!("worker task failed: {}", join)),
            }
        } else {
            plugin.worker.execute(&inputs).map_err(|e| e.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::interface::{PluginError, PluginResult, Worker};
    use crate::store::{MemoryResultStore, MemorySampleStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Harness {
        resolver: WorkResolver,
        registry: Arc<PluginRegistry>,
        samples: Arc<MemorySampleStore>,
        results: Arc<MemoryResultStore>,
    }

    fn harness(config: ResolverConfig) -> Harness {
        let registry = Arc::new(PluginRegistry::default());
        let samples = Arc::new(MemorySampleStore::default());
        let results = Arc::new(MemoryResultStore::new());
        let resolver = WorkResolver::new(
            registry.clone(),
            samples.clone(),
            results.clone(),
            config,
        );
        Harness {
            resolver,
            registry,
            samples,
            results,
        }
    }

    async fn add<W: Worker + 'static>(registry: &PluginRegistry, name: &str, deps: &[&str], worker: W) {
        let deps = deps.iter().map(|d| d.to_string()).collect();
        registry
            .register(PluginDescriptor::new(name, Arc::new(worker), deps, now()))
            .await;
    }

    fn length(inputs: &WorkInputs) -> PluginResult<WorkOutput> {
        let mut out = WorkOutput::new();
        out.insert("length".to_string(), json!(inputs.sample()?.length()));
        Ok(out)
    }

    fn doubled(inputs: &WorkInputs) -> PluginResult<WorkOutput> {
        let len = inputs
            .require("meta")?
            .get("length")
            .and_then(Value::as_u64)
            .ok_or_else(|| PluginError::missing_input("meta.length"))?;
        let mut out = WorkOutput::new();
        out.insert("doubled".to_string(), json!(2 * len));
        Ok(out)
    }

    fn echo_inputs(inputs: &WorkInputs) -> PluginResult<WorkOutput> {
        match inputs.to_json() {
            Value::Object(map) => Ok(map),
            _ => Err(PluginError::new("unreachable")),
        }
    }

    async fn store(h: &Harness, bytes: &[u8]) -> String {
        h.samples
            .store_sample("fixture", bytes.to_vec(), "text")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let h = harness(ResolverConfig::default());
        add(&h.registry, "meta", &["sample"], length).await;
        let id = store(&h, &[7u8; 42]).await;

        let first = h.resolver.resolve("meta", &id, None).await.unwrap();
        let second = h.resolver.resolve("meta", &id, None).await.unwrap();

        assert_eq!(first, json!({"length": 42}));
        assert_eq!(first, second);
        assert_eq!(h.resolver.stats().executions, 1);
        assert_eq!(h.resolver.stats().cache_hits, 1);
    }

    #[tokio::test]
    async fn test_plugin_update_invalidates() {
        let h = harness(ResolverConfig::default());
        add(&h.registry, "meta", &["sample"], length).await;
        let id = store(&h, b"abc").await;

        h.resolver.resolve("meta", &id, None).await.unwrap();
        let before = h.results.get_result("meta", &id).await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        add(&h.registry, "meta", &["sample"], length).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        h.resolver.resolve("meta", &id, None).await.unwrap();
        let after = h.results.get_result("meta", &id).await.unwrap().unwrap();

        assert_eq!(h.resolver.stats().executions, 2);
        let stamp = |v: &Value| v["__time_stamp"].as_str().unwrap().parse::<crate::core::Timestamp>().unwrap();
        assert!(stamp(&after) > stamp(&before));
    }

    #[tokio::test]
    async fn test_dependencies_namespaced() {
        let h = harness(ResolverConfig::default());
        add(&h.registry, "a", &[], |_: &WorkInputs| -> PluginResult<WorkOutput> {
            let mut out = WorkOutput::new();
            out.insert("x".to_string(), json!("from a"));
            Ok(out)
        })
        .await;
        add(&h.registry, "b", &[], |_: &WorkInputs| -> PluginResult<WorkOutput> {
            let mut out = WorkOutput::new();
            out.insert("x".to_string(), json!("from b"));
            out.insert("y".to_string(), json!(2));
            Ok(out)
        })
        .await;
        add(&h.registry, "c", &["a", "b"], echo_inputs).await;
        let id = store(&h, b"abc").await;

        let value = h.resolver.resolve("c", &id, None).await.unwrap();
        assert_eq!(value, json!({"a": {"x": "from a"}, "b": {"x": "from b", "y": 2}}));
    }

    #[tokio::test]
    async fn test_unknown_worker_is_soft_miss() {
        let h = harness(ResolverConfig::default());
        add(&h.registry, "partial", &["ghost", "sample"], length).await;
        let id = store(&h, b"abcd").await;

        let missing = h.resolver.resolve("ghost", &id, None).await.unwrap();
        assert_eq!(missing, json!({}));

        let partial = h.resolver.resolve("partial", &id, None).await.unwrap();
        assert_eq!(partial, json!({"length": 4}));
        assert_eq!(h.resolver.stats().soft_misses, 2);
    }

    #[tokio::test]
    async fn test_dependent_chain() {
        let h = harness(ResolverConfig::default());
        add(&h.registry, "meta", &["sample"], length).await;
        add(&h.registry, "derived", &["meta"], doubled).await;
        let id = store(&h, &[1u8; 42]).await;

        let value = h.resolver.resolve("derived", &id, None).await.unwrap();
        assert_eq!(value, json!({"doubled": 84}));
        assert!(h.results.get_result("meta", &id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_subtree() {
        let h = harness(ResolverConfig::default());
        add(&h.registry, "meta", &["sample"], length).await;
        add(&h.registry, "derived", &["meta"], doubled).await;
        let id = store(&h, b"abc").await;

        h.resolver.resolve("derived", &id, None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        add(&h.registry, "meta", &["sample"], length).await;

        // derived is still fresh, so stale meta is not revisited.
        h.resolver.resolve("derived", &id, None).await.unwrap();
        assert_eq!(h.resolver.stats().executions, 2);
    }

    #[tokio::test]
    async fn test_missing_sample_not_found() {
        let h = harness(ResolverConfig::default());
        add(&h.registry, "meta", &["sample"], length).await;

        let err = h.resolver.resolve("meta", "nope", None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(matches!(
            h.resolver.resolve("sample", "nope", None).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_sample_falls_back_to_set() {
        let h = harness(ResolverConfig::default());
        add(&h.registry, "set_size", &["sample"], |inputs: &WorkInputs| -> PluginResult<WorkOutput> {
            let set = inputs
                .sample_set
                .as_ref()
                .ok_or_else(|| PluginError::missing_input("sample_set"))?;
            let mut out = WorkOutput::new();
            out.insert("members".to_string(), json!(set.members.len()));
            Ok(out)
        })
        .await;
        let a = store(&h, b"one").await;
        let b = store(&h, b"two").await;
        let set_id = h.samples.store_sample_set(vec![a, b]).await.unwrap();

        let value = h.resolver.resolve("set_size", &set_id, None).await.unwrap();
        assert_eq!(value, json!({"members": 2}));
    }

    #[tokio::test]
    async fn test_dependency_cycle() {
        let h = harness(ResolverConfig::default());
        add(&h.registry, "a", &["b"], echo_inputs).await;
        add(&h.registry, "b", &["a"], echo_inputs).await;
        let id = store(&h, b"abc").await;

        let err = h.resolver.resolve("a", &id, None).await.unwrap_err();
        assert!(matches!(err, Error::DependencyCycle(ref chain) if chain == "a -> b -> a"));
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let h = harness(ResolverConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        add(&h.registry, "flaky", &["sample"], move |inputs: &WorkInputs| -> PluginResult<WorkOutput> {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(PluginError::new("first call fails"));
            }
            length(inputs)
        })
        .await;
        let id = store(&h, b"abc").await;

        let err = h.resolver.resolve("flaky", &id, None).await.unwrap_err();
        assert!(matches!(err, Error::PluginExecution { ref worker, .. } if worker == "flaky"));
        assert!(h.results.get_result("flaky", &id).await.unwrap().is_none());

        assert_eq!(h.resolver.resolve("flaky", &id, None).await.unwrap(), json!({"length": 3}));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.resolver.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_unreadable_cache_recomputes() {
        let h = harness(ResolverConfig::default());
        add(&h.registry, "meta", &["sample"], length).await;
        let id = store(&h, b"abc").await;
        h.results.store_result("meta", &id, json!("garbage")).await.unwrap();

        assert_eq!(h.resolver.resolve("meta", &id, None).await.unwrap(), json!({"length": 3}));
        assert_eq!(h.resolver.stats().executions, 1);
    }

    #[tokio::test]
    async fn test_subkeys() {
        let h = harness(ResolverConfig::default());
        add(&h.registry, "meta", &["sample"], length).await;
        let id = store(&h, b"abc").await;

        let keys = vec!["length".to_string()];
        let value = h.resolver.resolve("meta", &id, Some(&keys)).await.unwrap();
        assert_eq!(value, json!({"length": 3}));

        let bad = vec!["nope".to_string()];
        assert!(matches!(
            h.resolver.resolve("meta", &id, Some(&bad)).await,
            Err(Error::MissingSubkey(_))
        ));
    }

    #[tokio::test]
    async fn test_single_flight_deduplicates() {
        let config = ResolverConfig::default()
            .with_single_flight(true)
            .with_isolated_execution(true);
        let h = harness(config);
        add(&h.registry, "slow", &["sample"], |inputs: &WorkInputs| -> PluginResult<WorkOutput> {
            std::thread::sleep(Duration::from_millis(50));
            length(inputs)
        })
        .await;
        let id = store(&h, b"abc").await;

        let (a, b) = tokio::join!(
            h.resolver.resolve("slow", &id, None),
            h.resolver.resolve("slow", &id, None)
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(h.resolver.stats().executions, 1);
    }
}
