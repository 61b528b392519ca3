//! Chrome DevTools Protocol transport
//!
//! One websocket to the browser endpoint. Commands are JSON-RPC style
//! `{id, method, params, sessionId?}` frames; a single reader task routes
//! replies back to their caller by `id` and fans events out on a broadcast
//! channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{BrowserError, BrowserResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Reply = Result<Value, RpcError>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

const EVENT_BUFFER: usize = 512;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// A protocol event, optionally scoped to an attached target session.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Incoming {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<RpcError>,
    method: Option<String>,
    #[serde(default)]
    params: Value,
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

pub struct CdpConnection {
    writer: tokio::sync::Mutex<SplitSink<WsStream, Message>>,
    pending: Pending,
    next_id: AtomicU64,
    events: broadcast::Sender<CdpEvent>,
    reader: JoinHandle<()>,
    command_timeout: Duration,
}

impl CdpConnection {
    pub async fn connect(ws_url: &str, command_timeout: Duration) -> BrowserResult<Arc<Self>> {
        let (stream, _) = connect_async(ws_url)
            .await
            .map_err(|e| BrowserError::Connection(format!("{ws_url}: {e}")))?;
        let (writer, read) = stream.split();

        let pending: Pending = Arc::default();
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let reader = tokio::spawn(read_loop(read, pending.clone(), events.clone()));

        tracing::debug!(endpoint = ws_url, "DevTools connected");
        Ok(Arc::new(Self {
            writer: tokio::sync::Mutex::new(writer),
            pending,
            next_id: AtomicU64::new(1),
            events,
            reader,
            command_timeout,
        }))
    }

    /// Receive every event delivered after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    /// Send a command and wait for its reply.
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> BrowserResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = command_frame(id, method, params, session_id);

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);

        let sent = self.writer.lock().await.send(Message::Text(frame)).await;
        if let Err(e) = sent {
            lock(&self.pending).remove(&id);
            return Err(BrowserError::Connection(e.to_string()));
        }

        match tokio::time::timeout(self.command_timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(rpc))) => Err(BrowserError::Protocol {
                method: method.to_string(),
                message: rpc.message,
            }),
            Ok(Err(_)) => Err(BrowserError::Closed),
            Err(_) => {
                lock(&self.pending).remove(&id);
                Err(BrowserError::timeout(
                    format!("reply to {method}"),
                    self.command_timeout,
                ))
            }
        }
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn command_frame(id: u64, method: &str, params: Value, session_id: Option<&str>) -> String {
    let mut frame = json!({ "id": id, "method": method, "params": params });
    if let Some(session) = session_id {
        frame["sessionId"] = json!(session);
    }
    frame.to_string()
}

async fn read_loop(
    mut read: SplitStream<WsStream>,
    pending: Pending,
    events: broadcast::Sender<CdpEvent>,
) {
    while let Some(frame) = read.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(error = %e, "DevTools socket error");
                break;
            }
        };
        match serde_json::from_str::<Incoming>(&text) {
            Ok(message) => dispatch(message, &pending, &events),
            Err(e) => tracing::warn!(error = %e, "unparseable DevTools frame"),
        }
    }

    // Dropping the senders fails every outstanding call with `Closed`
    lock(&pending).clear();
    tracing::debug!("DevTools reader stopped");
}

fn dispatch(message: Incoming, pending: &Pending, events: &broadcast::Sender<CdpEvent>) {
    if let Some(id) = message.id {
        if let Some(tx) = lock(pending).remove(&id) {
            let reply = match message.error {
                Some(err) => Err(err),
                None => Ok(message.result.unwrap_or(Value::Null)),
            };
            let _ = tx.send(reply);
        }
    } else if let Some(method) = message.method {
        // No subscribers is fine
        let _ = events.send(CdpEvent {
            method,
            params: message.params,
            session_id: message.session_id,
        });
    }
}

/// Read a required string field out of a command result.
pub fn str_field(value: &Value, field: &str) -> BrowserResult<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BrowserError::Connection(format!("reply is missing `{field}`")))
}
