//! In-memory storage backends.
//!
//! Used by the server when no external database is configured, and by tests.

use crate::core::{Error, Result, SampleId};
use crate::store::backend::{ResultStore, SampleStore};
use crate::store::config::StoreConfig;
use crate::store::sample::{Sample, SampleSet};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

struct StoredSample {
    sample: Arc<Sample>,
    /// Insertion sequence, breaks import-time ties
    seq: u64,
}

#[derive(Default)]
struct SampleTables {
    samples: HashMap<SampleId, StoredSample>,
    sets: HashMap<SampleId, SampleSet>,
    next_seq: u64,
    total_bytes: u64,
}

impl SampleTables {
    /// Ids ordered newest-first.
    fn newest_first(&self) -> Vec<&StoredSample> {
        let mut entries: Vec<&StoredSample> = self.samples.values().collect();
        entries.sort_by(|a, b| {
            b.sample
                .import_time
                .cmp(&a.sample.import_time)
                .then(b.seq.cmp(&a.seq))
        });
        entries
    }

    /// Evict the oldest samples until the byte cap holds again.
    fn enforce_cap(&mut self, cap_bytes: u64, keep: &str) {
        while self.total_bytes > cap_bytes {
            let oldest = self
                .newest_first()
                .into_iter()
                .rev()
                .find(|entry| entry.sample.id != keep)
                .map(|entry| entry.sample.id.clone());
            let Some(id) = oldest else {
                break;
            };
            if let Some(evicted) = self.samples.remove(&id) {
                self.total_bytes -= evicted.sample.length() as u64;
                info!(sample = %id, "evicted sample to honour samples cap");
            }
        }
    }
}

/// Sample store kept in process memory.
pub struct MemorySampleStore {
    /// Configuration
    config: StoreConfig,
    /// Samples and sets
    tables: RwLock<SampleTables>,
}

impl MemorySampleStore {
    /// Create a new store.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            tables: RwLock::new(SampleTables::default()),
        }
    }

    /// Insert a fully built sample, keeping any existing record with the same id.
    pub async fn insert(&self, sample: Sample) -> SampleId {
        let mut tables = self.tables.write().await;
        let id = sample.id.clone();
        if tables.samples.contains_key(&id) {
            debug!(sample = %id, "sample already stored");
            return id;
        }

        let seq = tables.next_seq;
        tables.next_seq += 1;
        tables.total_bytes += sample.length() as u64;
        tables.samples.insert(
            id.clone(),
            StoredSample {
                sample: Arc::new(sample),
                seq,
            },
        );

        if let Some(cap) = self.config.samples_cap_bytes() {
            tables.enforce_cap(cap, &id);
        }
        id
    }
}

impl Default for MemorySampleStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

#[async_trait]
impl SampleStore for MemorySampleStore {
    async fn store_sample(
        &self,
        filename: &str,
        raw_bytes: Vec<u8>,
        type_tag: &str,
    ) -> Result<SampleId> {
        let sample = Sample::new(filename, raw_bytes, type_tag, &self.config.default_customer);
        Ok(self.insert(sample).await)
    }

    async fn get_sample(&self, id: &str) -> Result<Arc<Sample>> {
        let tables = self.tables.read().await;
        tables
            .samples
            .get(id)
            .map(|entry| entry.sample.clone())
            .ok_or_else(|| Error::sample_not_found(id))
    }

    async fn has_sample(&self, id: &str) -> Result<bool> {
        Ok(self.tables.read().await.samples.contains_key(id))
    }

    async fn store_sample_set(&self, members: Vec<SampleId>) -> Result<SampleId> {
        let mut tables = self.tables.write().await;
        if let Some(missing) = members.iter().find(|id| !tables.samples.contains_key(*id)) {
            return Err(Error::sample_not_found(missing));
        }

        let set = SampleSet::new(members);
        let id = set.id.clone();
        tables.sets.insert(id.clone(), set);
        Ok(id)
    }

    async fn get_sample_set(&self, id: &str) -> Result<SampleSet> {
        let tables = self.tables.read().await;
        tables
            .sets
            .get(id)
            .cloned()
            .ok_or_else(|| Error::sample_set_not_found(id))
    }

    async fn list_samples(
        &self,
        type_tag: Option<&str>,
        window_bytes: Option<u64>,
    ) -> Result<Vec<SampleId>> {
        let tables = self.tables.read().await;
        let mut ids = Vec::new();
        let mut cumulative = 0u64;

        for entry in tables.newest_first() {
            if let Some(tag) = type_tag {
                if entry.sample.type_tag != tag {
                    continue;
                }
            }
            if let Some(window) = window_bytes {
                cumulative += entry.sample.length() as u64;
                if cumulative > window {
                    break;
                }
            }
            ids.push(entry.sample.id.clone());
        }

        Ok(ids)
    }

    async fn clear(&self) -> Result<()> {
        let mut tables = self.tables.write().await;
        *tables = SampleTables::default();
        info!("cleared sample store");
        Ok(())
    }
}

/// Result store kept in process memory.
#[derive(Default)]
pub struct MemoryResultStore {
    /// collection -> key -> payload
    collections: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl MemoryResultStore {
    /// Create a new store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn store_result(&self, collection: &str, key: &str, payload: Value) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), payload);
        Ok(())
    }

    async fn get_result(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn clear(&self) -> Result<()> {
        self.collections.write().await.clear();
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let collections = self.collections.read().await;
        Ok(collections.values().map(|c| c.len() as u64).sum())
    }
}
