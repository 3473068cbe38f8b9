//! Built-in Workers
//!
//! Compiled-in worker implementations that manifests of kind `builtin`
//! refer to by id:
//! - `meta`: basic sample metadata
//! - `meta_deep`: digests and entropy
//! - `json_meta`: shape of JSON samples
//! - `strings`: printable ASCII runs
//! - `view_customer`: customer usage view

pub mod meta;
pub mod strings;
pub mod views;

pub use meta::{entropy, json_meta, meta, meta_deep};
pub use strings::{extract_strings, strings};
pub use views::view_customer;

use crate::plugin::catalog::WorkerCatalog;
use crate::plugin::interface::Worker;
use std::sync::Arc;

/// Register every built-in worker in a catalog.
pub fn register_builtins(catalog: &mut WorkerCatalog) {
    catalog.register("meta", || Arc::new(meta) as Arc<dyn Worker>);
    catalog.register("meta_deep", || Arc::new(meta_deep) as Arc<dyn Worker>);
    catalog.register("json_meta", || Arc::new(json_meta) as Arc<dyn Worker>);
    catalog.register("strings", || Arc::new(strings) as Arc<dyn Worker>);
    catalog.register("view_customer", || Arc::new(view_customer) as Arc<dyn Worker>);
}
