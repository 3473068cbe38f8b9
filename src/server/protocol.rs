//! JSON-lines wire protocol.
//!
//! Each request is one line: `{"id": "...", "method": "...", "params": {...}}`.
//! Each response is one line tagged by `type`: `result`, `item`, `end` or
//! `error`. Streaming methods answer with any number of `item` lines followed
//! by one `end` line.

use crate::core::{Error, Result};
use crate::service::BatchFilter;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A parsed request envelope.
#[derive(Clone, Debug, Deserialize)]
pub struct Request {
    /// Caller-chosen id, echoed on every response line
    pub id: String,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(default)]
    pub params: Value,
}

impl Request {
    /// Parse one request line. Trailing whitespace is ignored.
    pub fn parse(line: &str) -> Result<Self> {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            return Err(Error::Protocol("empty request line".to_string()));
        }
        serde_json::from_str(trimmed).map_err(|e| Error::Protocol(format!("malformed request: {}", e)))
    }

    /// Decode into a typed call.
    pub fn call(&self) -> Result<Call> {
        Call::decode(&self.method, self.params.clone())
    }
}

/// Error payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error tag
    pub kind: String,
    /// Human-readable message
    pub message: String,
}

/// A response line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Single-value answer
    Result {
        /// Request id
        id: String,
        /// Value
        value: Value,
    },
    /// One stream element
    Item {
        /// Request id
        id: String,
        /// Value
        value: Value,
    },
    /// Stream finished
    End {
        /// Request id
        id: String,
    },
    /// Request failed
    Error {
        /// Request id, when the request could be parsed
        id: Option<String>,
        /// Failure
        error: ErrorBody,
    },
}

impl Response {
    /// Failure response for an error.
    pub fn error(id: Option<String>, err: &Error) -> Self {
        Response::Error {
            id,
            error: ErrorBody {
                kind: err.kind().to_string(),
                message: err.to_string(),
            },
        }
    }

    /// Serialize as one line, newline included.
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Parameters of `store_sample`. Content is given as `text` or `base64`.
#[derive(Clone, Debug, Deserialize)]
pub struct StoreSampleParams {
    /// Original filename
    pub filename: String,
    /// Type tag
    pub type_tag: String,
    /// UTF-8 content
    pub text: Option<String>,
    /// Base64 content
    pub base64: Option<String>,
}

impl StoreSampleParams {
    /// Raw content bytes.
    pub fn raw_bytes(&self) -> Result<Vec<u8>> {
        match (&self.text, &self.base64) {
            (Some(text), None) => Ok(text.as_bytes().to_vec()),
            (None, Some(encoded)) => STANDARD
                .decode(encoded)
                .map_err(|e| Error::Protocol(format!("invalid base64 content: {}", e))),
            _ => Err(Error::Protocol(
                "store_sample needs exactly one of text or base64".to_string(),
            )),
        }
    }
}

/// Parameters of `work_request`.
#[derive(Clone, Debug, Deserialize)]
pub struct WorkRequestParams {
    /// Worker name
    pub worker: String,
    /// Sample or set id
    pub sample_id: String,
    /// Dotted paths to extract
    #[serde(default)]
    pub subkeys: Option<Vec<String>>,
}

/// Parameters of `batch_work_request`.
#[derive(Clone, Debug, Deserialize)]
pub struct BatchParams {
    /// Worker name
    pub worker: String,
    /// Samples to cover; every sample when absent
    #[serde(default)]
    pub filter: BatchFilter,
    /// Dotted paths to extract
    #[serde(default)]
    pub subkeys: Option<Vec<String>>,
}

/// Parameters of `stream_sample`.
#[derive(Clone, Debug, Deserialize)]
pub struct StreamSampleParams {
    /// Sample id
    pub sample_id: String,
    /// Row limit
    #[serde(default)]
    pub max_rows: Option<usize>,
}

/// Parameters of `index_worker_output`.
#[derive(Clone, Debug, Deserialize)]
pub struct IndexWorkerOutputParams {
    /// Worker name
    pub worker: String,
    /// Sample id
    pub sample_id: String,
    /// Index name
    pub index_name: String,
    /// Dotted subfield to index instead of the whole output
    #[serde(default)]
    pub subfield: Option<String>,
}

/// Parameters of `add_node`.
#[derive(Clone, Debug, Deserialize)]
pub struct AddNodeParams {
    /// Node id
    pub node_id: String,
    /// Display name
    pub name: String,
    /// Labels
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Parameters of `add_relationship`.
#[derive(Clone, Debug, Deserialize)]
pub struct AddRelationshipParams {
    /// Source node id
    pub source: String,
    /// Target node id
    pub target: String,
    /// Relationship name
    pub rel: String,
}

#[derive(Deserialize)]
struct SampleIdParam {
    sample_id: String,
}

#[derive(Deserialize)]
struct SetIdParam {
    set_id: String,
}

#[derive(Deserialize)]
struct WorkerParam {
    worker: String,
}

#[derive(Deserialize)]
struct NodeParam {
    node_id: String,
}

#[derive(Deserialize)]
struct TargetParam {
    target: String,
}

#[derive(Deserialize)]
struct WindowParams {
    type_tag: String,
    size_mb: u64,
}

#[derive(Deserialize)]
struct MembersParam {
    members: Vec<String>,
}

#[derive(Deserialize)]
struct IndexSampleParams {
    sample_id: String,
    index_name: String,
}

#[derive(Deserialize)]
struct SearchParams {
    index_name: String,
    query: String,
}

/// A decoded method call.
#[derive(Clone, Debug)]
pub enum Call {
    StoreSample(StoreSampleParams),
    GetSample { sample_id: String },
    HasSample { sample_id: String },
    GetSampleWindow { type_tag: String, size_mb: u64 },
    StoreSampleSet { members: Vec<String> },
    GetSampleSet { set_id: String },
    StreamSampleSet { set_id: String },
    ListWorkers,
    WorkerInfo { worker: String },
    WorkRequest(WorkRequestParams),
    BatchWorkRequest(BatchParams),
    StreamSample(StreamSampleParams),
    ClearDb,
    IndexSample { sample_id: String, index_name: String },
    IndexWorkerOutput(IndexWorkerOutputParams),
    Search { index_name: String, query: String },
    AddNode(AddNodeParams),
    HasNode { node_id: String },
    AddRelationship(AddRelationshipParams),
    ClearGraph,
    Stats,
    Cancel { target: String },
}

impl Call {
    /// Decode a method name and its parameters.
    pub fn decode(method: &str, params: Value) -> Result<Self> {
        let params = match params {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        let call = match method {
            "store_sample" => Call::StoreSample(parse(method, params)?),
            "get_sample" => {
                let p: SampleIdParam = parse(method, params)?;
                Call::GetSample { sample_id: p.sample_id }
            }
            "has_sample" => {
                let p: SampleIdParam = parse(method, params)?;
                Call::HasSample { sample_id: p.sample_id }
            }
            "get_sample_window" => {
                let p: WindowParams = parse(method, params)?;
                Call::GetSampleWindow {
                    type_tag: p.type_tag,
                    size_mb: p.size_mb,
                }
            }
            "store_sample_set" => {
                let p: MembersParam = parse(method, params)?;
                Call::StoreSampleSet { members: p.members }
            }
            "get_sample_set" => {
                let p: SetIdParam = parse(method, params)?;
                Call::GetSampleSet { set_id: p.set_id }
            }
            "stream_sample_set" => {
                let p: SetIdParam = parse(method, params)?;
                Call::StreamSampleSet { set_id: p.set_id }
            }
            "list_workers" => Call::ListWorkers,
            "worker_info" => {
                let p: WorkerParam = parse(method, params)?;
                Call::WorkerInfo { worker: p.worker }
            }
            "work_request" => Call::WorkRequest(parse(method, params)?),
            "batch_work_request" => Call::BatchWorkRequest(parse(method, params)?),
            "stream_sample" => Call::StreamSample(parse(method, params)?),
            "clear_db" => Call::ClearDb,
            "index_sample" => {
                let p: IndexSampleParams = parse(method, params)?;
                Call::IndexSample {
                    sample_id: p.sample_id,
                    index_name: p.index_name,
                }
            }
            "index_worker_output" => Call::IndexWorkerOutput(parse(method, params)?),
            "search" => {
                let p: SearchParams = parse(method, params)?;
                Call::Search {
                    index_name: p.index_name,
                    query: p.query,
                }
            }
            "add_node" => Call::AddNode(parse(method, params)?),
            "has_node" => {
                let p: NodeParam = parse(method, params)?;
                Call::HasNode { node_id: p.node_id }
            }
            "add_relationship" => Call::AddRelationship(parse(method, params)?),
            "clear_graph" => Call::ClearGraph,
            "stats" => Call::Stats,
            "cancel" => {
                let p: TargetParam = parse(method, params)?;
                Call::Cancel { target: p.target }
            }
            other => return Err(Error::Protocol(format!("unknown method: {}", other))),
        };
        Ok(call)
    }

    /// Whether the call answers with a stream.
    pub fn is_streaming(&self) -> bool {
        matches!(
            self,
            Call::StreamSampleSet { .. } | Call::BatchWorkRequest(_) | Call::StreamSample(_)
        )
    }
}

fn parse<T: DeserializeOwned>(method: &str, params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|e| Error::Protocol(format!("invalid params for {}: {}", method, e)))
}
