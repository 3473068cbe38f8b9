//! Server Module
//!
//! JSON-lines transport over TCP:
//! - Request/response envelopes
//! - Multi-value streaming with explicit end markers
//! - Per-stream cancellation
//!
//! Every request runs as its own task, so one connection can multiplex many
//! in-flight requests. Closing a connection cancels all of its streams.

pub mod protocol;

pub use protocol::{Call, ErrorBody, Request, Response};

use crate::core::{Error, Result};
use crate::service::{BatchRequest, RequestService};
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Network transport configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:4242".to_string(),
        }
    }
}

/// In-flight streams of one connection, keyed by request id.
type StreamTable = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// Accept connections until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    service: Arc<RequestService>,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "listening");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (socket, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                let service = service.clone();
                let token = shutdown.child_token();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(socket, peer, service, token).await {
                        warn!(%peer, error = %e, "connection ended with error");
                    }
                });
            }
        }
    }
}

async fn handle_connection(
    socket: TcpStream,
    peer: SocketAddr,
    service: Arc<RequestService>,
    token: CancellationToken,
) -> Result<()> {
    let connection = Uuid::new_v4();
    debug!(%peer, %connection, "connection opened");

    let (reader, mut writer) = socket.into_split();
    let (tx, mut rx) = mpsc::channel::<Response>(64);

    let write_task = tokio::spawn(async move {
        while let Some(response) = rx.recv().await {
            let line = match response.to_line() {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "failed to encode response");
                    continue;
                }
            };
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let streams: StreamTable = Arc::new(Mutex::new(HashMap::new()));
    let mut lines = BufReader::new(reader).lines();
    let outcome = loop {
        let line = tokio::select! {
            _ = token.cancelled() => break Ok(()),
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(e) => break Err(Error::Io(e)),
        };
        if line.trim().is_empty() {
            continue;
        }

        let request = match Request::parse(&line) {
            Ok(request) => request,
            Err(e) => {
                let _ = tx.send(Response::error(None, &e)).await;
                continue;
            }
        };
        let call = match request.call() {
            Ok(call) => call,
            Err(e) => {
                let _ = tx.send(Response::error(Some(request.id), &e)).await;
                continue;
            }
        };

        if let Call::Cancel { target } = call {
            let cancelled = match streams.lock().await.get(&target) {
                Some(stream_token) => {
                    stream_token.cancel();
                    true
                }
                None => false,
            };
            debug!(%connection, target = %target, cancelled, "cancel request");
            let _ = tx
                .send(Response::Result {
                    id: request.id,
                    value: json!(cancelled),
                })
                .await;
            continue;
        }

        let request_token = token.child_token();
        if call.is_streaming() {
            if let Err(e) = claim_stream(&streams, &request.id, request_token.clone()).await {
                let _ = tx.send(Response::error(Some(request.id), &e)).await;
                continue;
            }
        }
        let service = service.clone();
        let tx = tx.clone();
        let streams = streams.clone();
        tokio::spawn(async move {
            let id = request.id;
            let streaming = call.is_streaming();
            dispatch(&service, &id, call, &tx, &request_token).await;
            if streaming {
                streams.lock().await.remove(&id);
            }
        });
    };

    // Closing the connection cancels every stream it started.
    token.cancel();
    drop(tx);
    let _ = write_task.await;
    debug!(%peer, %connection, "connection closed");
    outcome
}

/// Track a new stream under its request id. Ids of in-flight streams cannot
/// be reused until the stream ends.
async fn claim_stream(streams: &StreamTable, id: &str, token: CancellationToken) -> Result<()> {
    let mut table = streams.lock().await;
    if table.contains_key(id) {
        return Err(Error::Protocol(format!("stream id {} is already in flight", id)));
    }
    table.insert(id.to_string(), token);
    Ok(())
}

/// Run one call and send its response lines.
async fn dispatch(
    service: &RequestService,
    id: &str,
    call: Call,
    tx: &mpsc::Sender<Response>,
    token: &CancellationToken,
) {
    if call.is_streaming() {
        match open_stream(service, call).await {
            Ok(stream) => pump(id, stream, tx, token).await,
            Err(e) => {
                let _ = tx.send(Response::error(Some(id.to_string()), &e)).await;
            }
        }
        return;
    }

    let response = match call_value(service, call).await {
        Ok(value) => Response::Result {
            id: id.to_string(),
            value,
        },
        Err(e) => Response::error(Some(id.to_string()), &e),
    };
    let _ = tx.send(response).await;
}

/// Forward stream elements until the stream ends, fails or is cancelled.
async fn pump(
    id: &str,
    mut stream: BoxStream<'static, Result<Value>>,
    tx: &mpsc::Sender<Response>,
    token: &CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(id = %id, "stream cancelled");
                break;
            }
            next = stream.next() => next,
        };
        match next {
            Some(Ok(value)) => {
                let item = Response::Item {
                    id: id.to_string(),
                    value,
                };
                if tx.send(item).await.is_err() {
                    return;
                }
            }
            Some(Err(e)) => {
                let _ = tx.send(Response::error(Some(id.to_string()), &e)).await;
                return;
            }
            None => break,
        }
    }
    let _ = tx.send(Response::End { id: id.to_string() }).await;
}

async fn open_stream(
    service: &RequestService,
    call: Call,
) -> Result<BoxStream<'static, Result<Value>>> {
    let stream = match call {
        Call::StreamSampleSet { set_id } => service
            .stream_sample_set(&set_id)
            .await?
            .map(|id| Ok(Value::String(id)))
            .boxed(),
        Call::BatchWorkRequest(params) => {
            let request = BatchRequest {
                filter: params.filter,
                subkeys: params.subkeys,
            };
            service
                .batch_work_request(&params.worker, request)
                .await?
                .map(|item| item.and_then(|item| Ok(serde_json::to_value(item)?)))
                .boxed()
        }
        Call::StreamSample(params) => service
            .stream_sample(&params.sample_id, params.max_rows)
            .await?
            .boxed(),
        other => {
            return Err(Error::Internal(format!("{:?} is not a streaming call", other)));
        }
    };
    Ok(stream)
}

async fn call_value(service: &RequestService, call: Call) -> Result<Value> {
    let value = match call {
        Call::StoreSample(params) => {
            let raw_bytes = params.raw_bytes()?;
            json!(service.store_sample(&params.filename, raw_bytes, &params.type_tag).await?)
        }
        Call::GetSample { sample_id } => service.get_sample(&sample_id).await?.to_json(),
        Call::HasSample { sample_id } => json!(service.has_sample(&sample_id).await?),
        Call::GetSampleWindow { type_tag, size_mb } => {
            json!(service.get_sample_window(&type_tag, size_mb).await?)
        }
        Call::StoreSampleSet { members } => json!(service.store_sample_set(members).await?),
        Call::GetSampleSet { set_id } => service.get_sample_set(&set_id).await?.to_json(),
        Call::ListWorkers => serde_json::to_value(service.list_workers().await)?,
        Call::WorkerInfo { worker } => serde_json::to_value(service.worker_info(&worker).await?)?,
        Call::WorkRequest(params) => {
            service
                .work_request(&params.worker, &params.sample_id, params.subkeys.as_deref())
                .await?
        }
        Call::ClearDb => {
            service.clear_db().await?;
            Value::Null
        }
        Call::IndexSample {
            sample_id,
            index_name,
        } => json!(service.index_sample(&sample_id, &index_name).await?),
        Call::IndexWorkerOutput(params) => {
            service
                .index_worker_output(
                    &params.worker,
                    &params.sample_id,
                    &params.index_name,
                    params.subfield.as_deref(),
                )
                .await?;
            Value::Null
        }
        Call::Search { index_name, query } => json!(service.search(&index_name, &query).await?),
        Call::AddNode(params) => {
            service
                .add_node(&params.node_id, &params.name, params.labels)
                .await?;
            Value::Null
        }
        Call::HasNode { node_id } => json!(service.has_node(&node_id).await?),
        Call::AddRelationship(params) => {
            service
                .add_relationship(&params.source, &params.target, &params.rel)
                .await?;
            Value::Null
        }
        Call::ClearGraph => {
            service.clear_graph().await?;
            Value::Null
        }
        Call::Stats => json!({
            "resolver": service.resolver().stats(),
            "service": service.stats(),
        }),
        other => {
            return Err(Error::Internal(format!("{:?} is not a single-value call", other)));
        }
    };
    Ok(value)
}
