//! Monitoring Module
//!
//! Provides observability for Workbench:
//! - Structured logging via tracing
//! - Resolver and service counters

pub mod logging;
pub mod metrics;

pub use logging::{init_tracing, LogFormat, LoggingConfig};
pub use metrics::{Counter, ResolverMetrics, ResolverStats, ServiceMetrics, ServiceStats};
