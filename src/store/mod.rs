//! Storage Module
//!
//! Sample and result persistence:
//! - Sample and sample set records
//! - Storage collaborator traits
//! - In-memory backends

pub mod backend;
pub mod config;
pub mod memory;
pub mod sample;

pub use backend::{ResultStore, SampleStore};
pub use config::StoreConfig;
pub use memory::{MemoryResultStore, MemorySampleStore};
pub use sample::{Sample, SampleSet};
