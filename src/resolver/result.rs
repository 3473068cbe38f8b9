//! Materialized worker results.

use crate::core::{SampleId, Timestamp};
use crate::plugin::interface::WorkOutput;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output of one worker on one sample, stamped with its computation time.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkResult {
    /// Producing worker
    pub worker: String,
    /// Sample or sample set id
    pub sample_id: SampleId,
    /// When the output was computed
    pub computed_at: Timestamp,
    /// Worker output
    pub output: WorkOutput,
}

/// Stored form of a result inside the result store.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredResult {
    output: WorkOutput,
    #[serde(rename = "__time_stamp")]
    computed_at: Timestamp,
}

impl WorkResult {
    /// Create a new result.
    pub fn new(worker: &str, sample_id: &str, computed_at: Timestamp, output: WorkOutput) -> Self {
        Self {
            worker: worker.to_string(),
            sample_id: sample_id.to_string(),
            computed_at,
            output,
        }
    }

    /// Whether the result is at least as new as the producing code.
    pub fn is_fresh(&self, modified_at: Timestamp) -> bool {
        self.computed_at >= modified_at
    }

    /// Payload written to the result store.
    pub fn to_payload(&self) -> Value {
        let stored = StoredResult {
            output: self.output.clone(),
            computed_at: self.computed_at,
        };
        serde_json::to_value(stored).unwrap_or(Value::Null)
    }

    /// Rebuild a result from a stored payload. `None` if the payload is unreadable.
    pub fn from_payload(worker: &str, sample_id: &str, payload: Value) -> Option<Self> {
        let stored: StoredResult = serde_json::from_value(payload).ok()?;
        Some(Self::new(worker, sample_id, stored.computed_at, stored.output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::now;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_freshness_boundary() {
        let t = now();
        let result = WorkResult::new("meta", "s", t, WorkOutput::new());

        assert!(result.is_fresh(t));
        assert!(result.is_fresh(t - Duration::seconds(1)));
        assert!(!result.is_fresh(t + Duration::seconds(1)));
    }

    #[test]
    fn test_payload_shape() {
        let mut output = WorkOutput::new();
        output.insert("length".to_string(), json!(42));
        let result = WorkResult::new("meta", "s", now(), output);

        let payload = result.to_payload();
        assert_eq!(payload["output"]["length"], 42);
        assert!(payload["__time_stamp"].is_string());

        let back = WorkResult::from_payload("meta", "s", payload).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_unreadable_payload() {
        assert!(WorkResult::from_payload("meta", "s", json!({"length": 1})).is_none());
        assert!(WorkResult::from_payload("meta", "s", json!("garbage")).is_none());
    }
}
