//! External Collaborators
//!
//! Narrow contracts for the full-text index and the graph database, with
//! in-memory implementations used by the server and tests:
//! - `Indexer`: document indexing and search
//! - `GraphStore`: nodes and relationships

pub mod graph;
pub mod index;

pub use graph::{GraphNode, GraphStore, MemoryGraph, Relationship};
pub use index::{Indexer, MemoryIndex};
