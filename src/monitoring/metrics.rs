//! In-process counters for the resolver and request service.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric (monotonically increasing).
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by amount.
    pub fn add(&self, amount: u64) {
        self.value.fetch_add(amount, Ordering::Relaxed);
    }

    /// Get current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Reset to zero.
    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

/// Resolver counters.
#[derive(Debug, Default)]
pub struct ResolverMetrics {
    /// Worker executions
    pub executions: Counter,
    /// Fresh cached results returned
    pub cache_hits: Counter,
    /// Unregistered worker names resolved to an empty contribution
    pub soft_misses: Counter,
    /// Failed worker executions
    pub failures: Counter,
}

impl ResolverMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> ResolverStats {
        ResolverStats {
            executions: self.executions.get(),
            cache_hits: self.cache_hits.get(),
            soft_misses: self.soft_misses.get(),
            failures: self.failures.get(),
        }
    }
}

/// Snapshot of [`ResolverMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverStats {
    /// Worker executions
    pub executions: u64,
    /// Fresh cached results returned
    pub cache_hits: u64,
    /// Soft misses
    pub soft_misses: u64,
    /// Failed executions
    pub failures: u64,
}

/// Request service counters.
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    /// Requests handled
    pub requests: Counter,
    /// Stream elements yielded
    pub items_streamed: Counter,
    /// Batch elements skipped on a skippable error
    pub items_skipped: Counter,
}

impl ServiceMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> ServiceStats {
        ServiceStats {
            requests: self.requests.get(),
            items_streamed: self.items_streamed.get(),
            items_skipped: self.items_skipped.get(),
        }
    }
}

/// Snapshot of [`ServiceMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Requests handled
    pub requests: u64,
    /// Stream elements yielded
    pub items_streamed: u64,
    /// Batch elements skipped
    pub items_skipped: u64,
}
