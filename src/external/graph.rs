//! Graph database collaborator.

use crate::core::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A graph node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Unique node id (`www.evil4u.com`)
    pub node_id: String,
    /// Display name
    pub name: String,
    /// Labels (`domain`, `evil`, ...)
    pub labels: Vec<String>,
}

/// A directed, named relationship between two nodes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Source node id
    pub source: String,
    /// Target node id
    pub target: String,
    /// Relationship name
    pub rel: String,
}

/// Graph store.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Add a node, replacing any node with the same id.
    async fn add_node(&self, node_id: &str, name: &str, labels: Vec<String>) -> Result<()>;

    /// Whether a node exists.
    async fn has_node(&self, node_id: &str) -> Result<bool>;

    /// Add a relationship. Both nodes must already exist.
    async fn add_relationship(&self, source: &str, target: &str, rel: &str) -> Result<()>;

    /// Remove every node and relationship.
    async fn clear(&self) -> Result<()>;
}

#[derive(Default)]
struct GraphTables {
    nodes: HashMap<String, GraphNode>,
    relationships: Vec<Relationship>,
}

/// Graph kept in process memory.
#[derive(Default)]
pub struct MemoryGraph {
    tables: RwLock<GraphTables>,
}

impl MemoryGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Relationships leaving a node.
    pub async fn relationships_from(&self, source: &str) -> Vec<Relationship> {
        self.tables
            .read()
            .await
            .relationships
            .iter()
            .filter(|r| r.source == source)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn add_node(&self, node_id: &str, name: &str, labels: Vec<String>) -> Result<()> {
        let node = GraphNode {
            node_id: node_id.to_string(),
            name: name.to_string(),
            labels,
        };
        self.tables
            .write()
            .await
            .nodes
            .insert(node_id.to_string(), node);
        Ok(())
    }

    async fn has_node(&self, node_id: &str) -> Result<bool> {
        Ok(self.tables.read().await.nodes.contains_key(node_id))
    }

    async fn add_relationship(&self, source: &str, target: &str, rel: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        for id in [source, target] {
            if !tables.nodes.contains_key(id) {
                return Err(Error::NotFound {
                    kind: "node",
                    id: id.to_string(),
                });
            }
        }
        let relationship = Relationship {
            source: source.to_string(),
            target: target.to_string(),
            rel: rel.to_string(),
        };
        if !tables.relationships.contains(&relationship) {
            tables.relationships.push(relationship);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.nodes.clear();
        tables.relationships.clear();
        Ok(())
    }
}
