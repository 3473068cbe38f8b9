//! Sample and sample set records.

use crate::core::{now, Fingerprint, SampleId, Timestamp};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// An immutable, content-addressed input artifact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    /// Content fingerprint (hex)
    pub id: SampleId,
    /// Original filename (metadata only)
    pub filename: String,
    /// Type tag (`pe`, `pcap`, `json`, `log`, ...)
    pub type_tag: String,
    /// Import time
    pub import_time: Timestamp,
    /// Customer tag
    pub customer: String,
    /// Raw content
    pub raw_bytes: Vec<u8>,
}

impl Sample {
    /// Create a new sample, fingerprinting its content.
    pub fn new(filename: &str, raw_bytes: Vec<u8>, type_tag: &str, customer: &str) -> Self {
        Self {
            id: Fingerprint::digest(&raw_bytes).to_hex(),
            filename: filename.to_string(),
            type_tag: type_tag.to_string(),
            import_time: now(),
            customer: customer.to_string(),
            raw_bytes,
        }
    }

    /// Set the import time.
    pub fn with_import_time(mut self, import_time: Timestamp) -> Self {
        self.import_time = import_time;
        self
    }

    /// Size of the raw content in bytes.
    pub fn length(&self) -> usize {
        self.raw_bytes.len()
    }

    /// JSON view of the sample, raw bytes base64-encoded.
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "filename": self.filename,
            "type_tag": self.type_tag,
            "import_time": self.import_time,
            "customer": self.customer,
            "length": self.length(),
            "raw_bytes": STANDARD.encode(&self.raw_bytes),
        })
    }
}

/// An immutable ordered group of sample ids.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleSet {
    /// Fingerprint of the member list
    pub id: SampleId,
    /// Member sample ids, in insertion order
    pub members: Vec<SampleId>,
}

impl SampleSet {
    /// Create a set, fingerprinting the member list.
    pub fn new(members: Vec<SampleId>) -> Self {
        Self {
            id: Fingerprint::of_members(&members).to_hex(),
            members,
        }
    }

    /// JSON view of the set.
    pub fn to_json(&self) -> Value {
        json!({ "id": self.id, "members": self.members })
    }
}
