//! # Workbench
//!
//! A plugin-based computation engine for security-analysis pipelines:
//! - **Plugins**: hot-reloadable worker modules declared by TOML manifests
//! - **Resolver**: recursive dependency resolution with staleness-aware caching
//! - **Service**: single, batch and streaming requests over stored samples
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use workbench::{Workbench, WorkbenchConfig};
//!
//! #[tokio::main]
//! async fn main() -> workbench::Result<()> {
//!     let workbench = Workbench::init(WorkbenchConfig::default()).await?;
//!     let service = workbench.service();
//!
//!     let id = service.store_sample("hello.txt", b"hello".to_vec(), "text").await?;
//!     let meta = service.work_request("meta", &id, None).await?;
//!     println!("{}", meta);
//!
//!     workbench.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod engine;
pub mod external;
pub mod monitoring;
pub mod plugin;
pub mod resolver;
pub mod server;
pub mod service;
pub mod store;
pub mod workers;

pub use config::WorkbenchConfig;
pub use core::error::{Error, Result};
pub use engine::{Collaborators, Workbench};
