//! Full-text index collaborator.

use crate::core::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Document index.
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Add a document to an index, creating the index if needed.
    async fn index_data(&self, index_name: &str, document: Value) -> Result<()>;

    /// Documents in an index matching a query.
    async fn search(&self, index_name: &str, query: &str) -> Result<Vec<Value>>;

    /// Drop every index.
    async fn clear(&self) -> Result<()>;
}

/// Index kept in process memory.
///
/// A document matches when its serialized form contains the query,
/// ignoring case. An empty query matches everything.
#[derive(Default)]
pub struct MemoryIndex {
    indexes: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Indexer for MemoryIndex {
    async fn index_data(&self, index_name: &str, document: Value) -> Result<()> {
        self.indexes
            .write()
            .await
            .entry(index_name.to_string())
            .or_default()
            .push(document);
        debug!(index = %index_name, "indexed document");
        Ok(())
    }

    async fn search(&self, index_name: &str, query: &str) -> Result<Vec<Value>> {
        let needle = query.to_lowercase();
        let indexes = self.indexes.read().await;
        let Some(documents) = indexes.get(index_name) else {
            return Ok(Vec::new());
        };
        Ok(documents
            .iter()
            .filter(|doc| doc.to_string().to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        self.indexes.write().await.clear();
        Ok(())
    }
}
