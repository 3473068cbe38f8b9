//! Service Module
//!
//! Operations exposed to external callers:
//! - Single and batch work requests
//! - Sample, sample set and worker metadata operations
//! - Lazy, cancellable result and row streams
//! - Index and graph collaborator operations

pub mod decode;
pub mod request;
pub mod stream;

pub use decode::{DecoderRegistry, RowDecoder, RowIter};
pub use request::{BatchFilter, BatchItem, BatchRequest, RequestService};
pub use stream::WorkStream;
