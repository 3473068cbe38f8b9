//! Request service: the operations exposed to external callers.

use crate::core::{Error, Result, SampleId};
use crate::external::{GraphStore, Indexer};
use crate::monitoring::metrics::{ServiceMetrics, ServiceStats};
use crate::plugin::interface::WorkerInfo;
use crate::resolver::{subkeys, WorkResolver};
use crate::service::decode::DecoderRegistry;
use crate::service::stream::WorkStream;
use crate::store::{Sample, SampleSet};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Which samples a batch request covers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchFilter {
    /// Explicit ids, in order
    Ids(Vec<SampleId>),
    /// Members of a sample set, in order
    SampleSet(SampleId),
    /// Every stored sample, newest first, optionally of one type
    TypeTag(Option<String>),
}

impl Default for BatchFilter {
    fn default() -> Self {
        BatchFilter::TypeTag(None)
    }
}

/// A batch work request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Samples to cover
    #[serde(default)]
    pub filter: BatchFilter,
    /// Dotted paths to extract from each result
    #[serde(default)]
    pub subkeys: Option<Vec<String>>,
}

impl BatchRequest {
    /// Request over a filter.
    pub fn new(filter: BatchFilter) -> Self {
        Self {
            filter,
            subkeys: None,
        }
    }

    /// Set subkeys.
    pub fn with_subkeys(mut self, subkeys: Vec<String>) -> Self {
        self.subkeys = Some(subkeys);
        self
    }
}

/// One element of a batch result stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    /// Sample the output belongs to
    pub sample_id: SampleId,
    /// Worker output, or the extracted subkeys
    pub output: Value,
}

/// Single, batch and streaming operations over the resolver and its
/// collaborators.
pub struct RequestService {
    /// Work resolver
    resolver: Arc<WorkResolver>,
    /// Row decoders for sample streaming
    decoders: DecoderRegistry,
    /// Full-text index collaborator
    indexer: Arc<dyn Indexer>,
    /// Graph collaborator
    graph: Arc<dyn GraphStore>,
    /// Counters
    metrics: Arc<ServiceMetrics>,
}

impl RequestService {
    /// Create a new service with the built-in decoders.
    pub fn new(
        resolver: Arc<WorkResolver>,
        indexer: Arc<dyn Indexer>,
        graph: Arc<dyn GraphStore>,
    ) -> Self {
        Self {
            resolver,
            decoders: DecoderRegistry::with_builtins(),
            indexer,
            graph,
            metrics: Arc::new(ServiceMetrics::new()),
        }
    }

    /// Replace the decoder registry.
    pub fn with_decoders(mut self, decoders: DecoderRegistry) -> Self {
        self.decoders = decoders;
        self
    }

    /// The work resolver.
    pub fn resolver(&self) -> &Arc<WorkResolver> {
        &self.resolver
    }

    /// Counter snapshot.
    pub fn stats(&self) -> ServiceStats {
        self.metrics.snapshot()
    }

    // Samples

    /// Store a sample, returning its fingerprint.
    pub async fn store_sample(
        &self,
        filename: &str,
        raw_bytes: Vec<u8>,
        type_tag: &str,
    ) -> Result<SampleId> {
        self.metrics.requests.inc();
        let length = raw_bytes.len();
        let id = self
            .resolver
            .samples()
            .store_sample(filename, raw_bytes, type_tag)
            .await?;
        info!(sample = %id, filename = %filename, type_tag = %type_tag, length, "stored sample");
        Ok(id)
    }

    /// Fetch a sample.
    pub async fn get_sample(&self, sample_id: &str) -> Result<Arc<Sample>> {
        self.metrics.requests.inc();
        self.resolver.samples().get_sample(sample_id).await
    }

    /// Whether a sample exists.
    pub async fn has_sample(&self, sample_id: &str) -> Result<bool> {
        self.metrics.requests.inc();
        self.resolver.samples().has_sample(sample_id).await
    }

    /// Newest samples of a type whose cumulative size fits in `size_mb`.
    pub async fn get_sample_window(&self, type_tag: &str, size_mb: u64) -> Result<Vec<SampleId>> {
        self.metrics.requests.inc();
        self.resolver
            .samples()
            .list_samples(Some(type_tag), Some(size_mb.saturating_mul(BYTES_PER_MB)))
            .await
    }

    /// Group existing samples into a set. Fails if any member is missing.
    pub async fn store_sample_set(&self, members: Vec<SampleId>) -> Result<SampleId> {
        self.metrics.requests.inc();
        self.resolver.samples().store_sample_set(members).await
    }

    /// Fetch a sample set.
    pub async fn get_sample_set(&self, set_id: &str) -> Result<SampleSet> {
        self.metrics.requests.inc();
        self.resolver.samples().get_sample_set(set_id).await
    }

    /// Stream the member ids of a sample set.
    pub async fn stream_sample_set(&self, set_id: &str) -> Result<WorkStream<SampleId>> {
        let set = self.get_sample_set(set_id).await?;
        Ok(WorkStream::new(stream::iter(set.members)))
    }

    /// Remove every sample, set and stored result.
    pub async fn clear_db(&self) -> Result<()> {
        self.metrics.requests.inc();
        self.resolver.samples().clear().await?;
        self.resolver.results().clear().await?;
        info!("cleared samples and results");
        Ok(())
    }

    // Workers

    /// Metadata of every registered worker.
    pub async fn list_workers(&self) -> Vec<WorkerInfo> {
        self.metrics.requests.inc();
        self.resolver.registry().list().await
    }

    /// Metadata of one worker.
    pub async fn worker_info(&self, worker: &str) -> Result<WorkerInfo> {
        self.metrics.requests.inc();
        self.resolver
            .registry()
            .get(worker)
            .await
            .map(|plugin| plugin.info())
            .ok_or_else(|| Error::UnknownWorker(worker.to_string()))
    }

    /// Resolve one worker on one sample.
    pub async fn work_request(
        &self,
        worker: &str,
        sample_id: &str,
        subkeys: Option<&[String]>,
    ) -> Result<Value> {
        self.metrics.requests.inc();
        self.resolver.resolve(worker, sample_id, subkeys).await
    }

    /// Resolve one worker over many samples, lazily.
    ///
    /// Samples that are missing, or whose result lacks a requested subkey,
    /// are skipped. Any other failure is yielded once and ends the stream.
    pub async fn batch_work_request(
        &self,
        worker: &str,
        request: BatchRequest,
    ) -> Result<WorkStream<Result<BatchItem>>> {
        self.metrics.requests.inc();
        let ids = match request.filter {
            BatchFilter::Ids(ids) => ids,
            BatchFilter::SampleSet(set_id) => {
                self.resolver.samples().get_sample_set(&set_id).await?.members
            }
            BatchFilter::TypeTag(type_tag) => {
                self.resolver
                    .samples()
                    .list_samples(type_tag.as_deref(), None)
                    .await?
            }
        };
        debug!(worker = %worker, samples = ids.len(), "batch work request");

        let resolver = self.resolver.clone();
        let metrics = self.metrics.clone();
        let worker = worker.to_string();
        let subkeys = request.subkeys;
        let items = async_stream::stream! {
            for sample_id in ids {
                match resolver.resolve(&worker, &sample_id, subkeys.as_deref()).await {
                    Ok(output) => {
                        metrics.items_streamed.inc();
                        yield Ok(BatchItem { sample_id, output });
                    }
                    Err(err) if err.is_skippable() => {
                        metrics.items_skipped.inc();
                        debug!(worker = %worker, sample = %sample_id, error = %err, "skipping batch element");
                    }
                    Err(err) => {
                        yield Err(err);
                        break;
                    }
                }
            }
        };
        Ok(WorkStream::new(items))
    }

    /// Stream a sample's decoded rows, at most `max_rows` of them.
    pub async fn stream_sample(
        &self,
        sample_id: &str,
        max_rows: Option<usize>,
    ) -> Result<WorkStream<Result<Value>>> {
        let sample = self.get_sample(sample_id).await?;
        let decoder = self
            .decoders
            .get(&sample.type_tag)
            .ok_or_else(|| Error::UnsupportedType {
                sample: sample.id.clone(),
                type_tag: sample.type_tag.clone(),
            })?;

        let rows = decoder.rows(sample)?;
        let rows = rows.take(max_rows.unwrap_or(usize::MAX));
        let metrics = self.metrics.clone();
        Ok(WorkStream::new(stream::iter(rows).inspect(move |_| {
            metrics.items_streamed.inc();
        })))
    }

    // Index

    /// Index every decoded row of a sample. Returns the number of rows.
    pub async fn index_sample(&self, sample_id: &str, index_name: &str) -> Result<usize> {
        let mut rows = self.stream_sample(sample_id, None).await?;
        let mut indexed = 0;
        while let Some(row) = rows.next().await {
            self.indexer.index_data(index_name, row?).await?;
            indexed += 1;
        }
        info!(sample = %sample_id, index = %index_name, rows = indexed, "indexed sample");
        Ok(indexed)
    }

    /// Index a worker's output, or one dotted subfield of it.
    pub async fn index_worker_output(
        &self,
        worker: &str,
        sample_id: &str,
        index_name: &str,
        subfield: Option<&str>,
    ) -> Result<()> {
        let output = self.work_request(worker, sample_id, None).await?;
        let document = match subfield {
            Some(path) => subkeys::lookup(&output, path)
                .cloned()
                .ok_or_else(|| Error::MissingSubkey(path.to_string()))?,
            None => output,
        };
        self.indexer.index_data(index_name, document).await
    }

    /// Search an index.
    pub async fn search(&self, index_name: &str, query: &str) -> Result<Vec<Value>> {
        self.metrics.requests.inc();
        self.indexer.search(index_name, query).await
    }

    // Graph

    /// Add a graph node.
    pub async fn add_node(&self, node_id: &str, name: &str, labels: Vec<String>) -> Result<()> {
        self.metrics.requests.inc();
        self.graph.add_node(node_id, name, labels).await
    }

    /// Whether a graph node exists.
    pub async fn has_node(&self, node_id: &str) -> Result<bool> {
        self.metrics.requests.inc();
        self.graph.has_node(node_id).await
    }

    /// Relate two existing nodes.
    pub async fn add_relationship(&self, source: &str, target: &str, rel: &str) -> Result<()> {
        self.metrics.requests.inc();
        self.graph.add_relationship(source, target, rel).await
    }

    /// Remove every node and relationship.
    pub async fn clear_graph(&self) -> Result<()> {
        self.metrics.requests.inc();
        self.graph.clear().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::now;
    use crate::external::{MemoryGraph, MemoryIndex};
    use crate::plugin::interface::{PluginDescriptor, PluginError, PluginResult, WorkInputs, WorkOutput};
    use crate::plugin::registry::PluginRegistry;
    use crate::resolver::ResolverConfig;
    use crate::store::{MemoryResultStore, MemorySampleStore};
    use serde_json::json;

    async fn service() -> RequestService {
        let registry = Arc::new(PluginRegistry::default());
        registry
            .register(PluginDescriptor::new(
                "meta",
                Arc::new(|inputs: &WorkInputs| -> PluginResult<WorkOutput> {
                    let sample = inputs.sample()?;
                    let mut out = WorkOutput::new();
                    out.insert("length".to_string(), json!(sample.length()));
                    out.insert("type_tag".to_string(), json!(sample.type_tag));
                    if sample.raw_bytes.starts_with(b"MZ") {
                        out.insert("pe".to_string(), json!(true));
                    }
                    Ok(out)
                }),
                vec!["sample".to_string()],
                now(),
            ))
            .await;
        registry
            .register(PluginDescriptor::new(
                "picky",
                Arc::new(|inputs: &WorkInputs| -> PluginResult<WorkOutput> {
                    if inputs.sample()?.raw_bytes == b"poison" {
                        return Err(PluginError::new("refusing poison"));
                    }
                    Ok(WorkOutput::new())
                }),
                vec!["sample".to_string()],
                now(),
            ))
            .await;

        let resolver = Arc::new(WorkResolver::new(
            registry,
            Arc::new(MemorySampleStore::default()),
            Arc::new(MemoryResultStore::new()),
            ResolverConfig::default(),
        ));
        RequestService::new(resolver, Arc::new(MemoryIndex::new()), Arc::new(MemoryGraph::new()))
    }

    async fn collect(mut items: WorkStream<Result<BatchItem>>) -> Vec<Result<BatchItem>> {
        let mut out = Vec::new();
        while let Some(item) = items.next().await {
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn test_batch_skips_missing_subkey() {
        let service = service().await;
        let a = service.store_sample("a", b"MZ one".to_vec(), "pe").await.unwrap();
        let b = service.store_sample("b", b"text".to_vec(), "text").await.unwrap();
        let c = service.store_sample("c", b"MZ three".to_vec(), "pe").await.unwrap();
        let set = service
            .store_sample_set(vec![a.clone(), b, c.clone()])
            .await
            .unwrap();

        let request = BatchRequest::new(BatchFilter::SampleSet(set)).with_subkeys(vec!["pe".to_string()]);
        let items = collect(service.batch_work_request("meta", request).await.unwrap()).await;

        let ids: Vec<String> = items.into_iter().map(|i| i.unwrap().sample_id).collect();
        assert_eq!(ids, vec![a, c]);
        assert_eq!(service.stats().items_skipped, 1);
    }

    #[tokio::test]
    async fn test_batch_skips_unknown_ids() {
        let service = service().await;
        let a = service.store_sample("a", b"one".to_vec(), "text").await.unwrap();

        let request = BatchRequest::new(BatchFilter::Ids(vec!["missing".to_string(), a.clone()]));
        let items = collect(service.batch_work_request("meta", request).await.unwrap()).await;

        assert_eq!(items.len(), 1);
        let item = items.into_iter().next().unwrap().unwrap();
        assert_eq!(item.sample_id, a);
        assert_eq!(item.output, json!({"length": 3, "type_tag": "text"}));
    }

    #[tokio::test]
    async fn test_batch_ends_on_execution_error() {
        let service = service().await;
        let ids = vec![
            service.store_sample("a", b"fine".to_vec(), "text").await.unwrap(),
            service.store_sample("b", b"poison".to_vec(), "text").await.unwrap(),
            service.store_sample("c", b"also fine".to_vec(), "text").await.unwrap(),
        ];

        let items = collect(
            service
                .batch_work_request("picky", BatchRequest::new(BatchFilter::Ids(ids)))
                .await
                .unwrap(),
        )
        .await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(Error::PluginExecution { .. })));
    }

    #[tokio::test]
    async fn test_batch_by_type_tag() {
        let service = service().await;
        service.store_sample("a", b"one".to_vec(), "text").await.unwrap();
        service.store_sample("b", b"MZ".to_vec(), "pe").await.unwrap();

        let request = BatchRequest::new(BatchFilter::TypeTag(Some("pe".to_string())));
        let items = collect(service.batch_work_request("meta", request).await.unwrap()).await;
        assert_eq!(items.len(), 1);

        let all = collect(service.batch_work_request("meta", BatchRequest::default()).await.unwrap()).await;
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_stream_sample_rows() {
        let service = service().await;
        let id = service
            .store_sample("app.log", b"one\ntwo\nthree\n".to_vec(), "log")
            .await
            .unwrap();

        let mut rows = service.stream_sample(&id, Some(2)).await.unwrap();
        assert_eq!(rows.next().await.unwrap().unwrap(), json!({"row": "one"}));
        assert_eq!(rows.next().await.unwrap().unwrap(), json!({"row": "two"}));
        assert!(rows.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_sample_unsupported() {
        let service = service().await;
        let id = service.store_sample("a.exe", b"MZ".to_vec(), "pe").await.unwrap();

        let err = service.stream_sample(&id, None).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedType { ref type_tag, .. } if type_tag == "pe"));
    }

    #[tokio::test]
    async fn test_stream_sample_set_and_cancel() {
        let service = service().await;
        let a = service.store_sample("a", b"one".to_vec(), "text").await.unwrap();
        let b = service.store_sample("b", b"two".to_vec(), "text").await.unwrap();
        let set = service.store_sample_set(vec![a.clone(), b]).await.unwrap();

        let mut members = service.stream_sample_set(&set).await.unwrap();
        assert_eq!(members.next().await, Some(a));
        members.cancel();
        assert_eq!(members.next().await, None);
    }

    #[tokio::test]
    async fn test_sample_window() {
        let service = service().await;
        service.store_sample("a", vec![1; 600 * 1024], "pcap").await.unwrap();
        let newest = service.store_sample("b", vec![2; 600 * 1024], "pcap").await.unwrap();

        let window = service.get_sample_window("pcap", 1).await.unwrap();
        assert_eq!(window, vec![newest]);
    }

    #[tokio::test]
    async fn test_worker_info_and_clear() {
        let service = service().await;
        assert_eq!(service.list_workers().await.len(), 2);
        assert_eq!(service.worker_info("meta").await.unwrap().dependencies, vec!["sample"]);
        assert!(matches!(
            service.worker_info("ghost").await,
            Err(Error::UnknownWorker(_))
        ));

        let id = service.store_sample("a", b"one".to_vec(), "text").await.unwrap();
        service.work_request("meta", &id, None).await.unwrap();
        service.clear_db().await.unwrap();
        assert!(!service.has_sample(&id).await.unwrap());
        assert_eq!(service.resolver().results().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_index_operations() {
        let service = service().await;
        let id = service
            .store_sample("dns.log", b"www.evil4u.com\nexample.org\n".to_vec(), "log")
            .await
            .unwrap();

        assert_eq!(service.index_sample(&id, "dns").await.unwrap(), 2);
        assert_eq!(service.search("dns", "evil4u").await.unwrap().len(), 1);

        service
            .index_worker_output("meta", &id, "meta", Some("type_tag"))
            .await
            .unwrap();
        assert_eq!(service.search("meta", "log").await.unwrap(), vec![json!("log")]);
        assert!(matches!(
            service.index_worker_output("meta", &id, "meta", Some("nope")).await,
            Err(Error::MissingSubkey(_))
        ));
    }

    #[tokio::test]
    async fn test_graph_operations() {
        let service = service().await;
        service.add_node("evil.com", "evil", vec!["domain".to_string()]).await.unwrap();
        service.add_node("10.0.0.1", "host", vec![]).await.unwrap();
        service.add_relationship("10.0.0.1", "evil.com", "queried").await.unwrap();
        assert!(service.has_node("evil.com").await.unwrap());

        service.clear_graph().await.unwrap();
        assert!(!service.has_node("evil.com").await.unwrap());
    }
}
