//! Resolver configuration.

use serde::{Deserialize, Serialize};

/// Work resolver configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Allow at most one in-flight recomputation per (worker, sample) key;
    /// concurrent callers wait and receive the freshly cached result
    pub single_flight: bool,
    /// Run worker execution on the blocking thread pool instead of the
    /// request-handling task
    pub isolate_execution: bool,
}

impl ResolverConfig {
    /// Enable per-key single-flight.
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    /// Enable isolated execution.
    pub fn with_isolated_execution(mut self, enabled: bool) -> Self {
        self.isolate_execution = enabled;
        self
    }
}
