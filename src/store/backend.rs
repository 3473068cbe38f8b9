//! Storage collaborator traits.
//!
//! The resolver and the request service only talk to storage through these
//! two narrow contracts, so backends can be swapped without touching them.

use crate::core::{Result, SampleId};
use crate::store::sample::{Sample, SampleSet};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Sample and sample set storage.
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Store a sample, returning its content fingerprint.
    ///
    /// Storing identical bytes again returns the existing id and keeps the
    /// original record.
    async fn store_sample(&self, filename: &str, raw_bytes: Vec<u8>, type_tag: &str)
        -> Result<SampleId>;

    /// Fetch a sample. Fails with `NotFound` if absent.
    async fn get_sample(&self, id: &str) -> Result<Arc<Sample>>;

    /// Whether a sample exists.
    async fn has_sample(&self, id: &str) -> Result<bool>;

    /// Store a sample set. Every member must already exist.
    async fn store_sample_set(&self, members: Vec<SampleId>) -> Result<SampleId>;

    /// Fetch a sample set. Fails with `NotFound` if absent.
    async fn get_sample_set(&self, id: &str) -> Result<SampleSet>;

    /// List sample ids newest-first.
    ///
    /// `type_tag` restricts the listing to one type; `window_bytes` stops the
    /// listing once the cumulative size would exceed the window.
    async fn list_samples(
        &self,
        type_tag: Option<&str>,
        window_bytes: Option<u64>,
    ) -> Result<Vec<SampleId>>;

    /// Remove every sample and sample set.
    async fn clear(&self) -> Result<()>;
}

/// Persistence of worker results.
///
/// Payloads are opaque to the store; the resolver embeds its own timestamps.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Store a payload, silently replacing any previous one.
    async fn store_result(&self, collection: &str, key: &str, payload: Value) -> Result<()>;

    /// Fetch a payload, if present.
    async fn get_result(&self, collection: &str, key: &str) -> Result<Option<Value>>;

    /// Remove every stored payload.
    async fn clear(&self) -> Result<()>;

    /// Number of stored payloads across collections.
    async fn count(&self) -> Result<u64> {
        Ok(0)
    }
}
