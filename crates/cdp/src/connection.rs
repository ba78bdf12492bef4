//! Command/response correlation over the DevTools WebSocket.
//!
//! Each command gets a unique id and a oneshot channel; a reader task drains
//! incoming frames and completes the matching channel. Frames without an id
//! are protocol events, which this driver only traces.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};

use crate::error::{CdpError, Result};

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;
type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

#[derive(Debug, Serialize)]
struct Command<'a> {
    id: u64,
    method: &'a str,
    params: Value,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct Frame {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<ProtocolError>,
    method: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProtocolError {
    #[allow(dead_code)]
    code: i64,
    message: String,
}

pub struct Connection {
    next_id: AtomicU64,
    pending: Pending,
    sink: Mutex<WsSink>,
    reader: Mutex<Option<JoinHandle<()>>>,
    command_timeout: Duration,
}

impl Connection {
    /// Connects to the browser-level DevTools WebSocket URL.
    pub async fn connect(ws_url: &str) -> Result<Arc<Self>> {
        let (ws, _) = connect_async(ws_url).await?;
        let (sink, mut stream) = ws.split();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let reader_pending = Arc::clone(&pending);
        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => route_frame(&reader_pending, &text).await,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(target = "cdp", error = %e, "devtools stream error");
                        break;
                    }
                }
            }

            // Fail anything still waiting so callers do not hang.
            let mut map = reader_pending.lock().await;
            for (_, tx) in map.drain() {
                let _ = tx.send(Err(CdpError::ConnectionClosed));
            }
            debug!(target = "cdp", "devtools stream ended");
        });

        Ok(Arc::new(Self {
            next_id: AtomicU64::new(1),
            pending,
            sink: Mutex::new(sink),
            reader: Mutex::new(Some(reader)),
            command_timeout: Duration::from_secs(30),
        }))
    }

    /// Sends one command and awaits its response, bounded by the command
    /// timeout. `session_id` routes the command to an attached page target.
    pub async fn send(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let command = Command {
            id,
            method,
            params,
            session_id,
        };
        let payload = serde_json::to_string(&command)?;
        trace!(target = "cdp", id, method, "send");

        if let Err(e) = self.sink.lock().await.send(Message::Text(payload)).await {
            self.pending.lock().await.remove(&id);
            return Err(e.into());
        }

        match tokio::time::timeout(self.command_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CdpError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(CdpError::Timeout {
                    ms: self.command_timeout.as_millis() as u64,
                    what: format!("response to {method}"),
                })
            }
        }
    }

    /// Stops the reader task and drops the socket. Safe to call once.
    pub async fn shutdown(&self) {
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        let _ = self.sink.lock().await.close().await;
    }
}

async fn route_frame(pending: &Pending, text: &str) {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(target = "cdp", error = %e, "unparseable devtools frame");
            return;
        }
    };

    match frame.id {
        Some(id) => {
            let Some(tx) = pending.lock().await.remove(&id) else {
                warn!(target = "cdp", id, "response with no pending command");
                return;
            };
            let result = match frame.error {
                Some(err) => Err(CdpError::Protocol {
                    method: frame.method.unwrap_or_else(|| format!("command #{id}")),
                    message: err.message,
                }),
                None => Ok(frame.result.unwrap_or(Value::Null)),
            };
            let _ = tx.send(result);
        }
        None => {
            trace!(
                target = "cdp",
                method = frame.method.as_deref().unwrap_or("<unknown>"),
                "event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_pending() -> Pending {
        Arc::new(Mutex::new(HashMap::new()))
    }

    #[tokio::test]
    async fn response_completes_pending_command() {
        let pending = new_pending();
        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(7, tx);

        route_frame(&pending, r#"{"id":7,"result":{"frameId":"F1"}}"#).await;

        let value = rx.await.unwrap().unwrap();
        assert_eq!(value["frameId"], "F1");
        assert!(pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn protocol_error_surfaces_as_error() {
        let pending = new_pending();
        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(3, tx);

        route_frame(
            &pending,
            r#"{"id":3,"error":{"code":-32000,"message":"No target with given id"}}"#,
        )
        .await;

        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(err, CdpError::Protocol { .. }));
        assert!(err.to_string().contains("No target with given id"));
    }

    #[tokio::test]
    async fn events_are_ignored() {
        let pending = new_pending();
        route_frame(
            &pending,
            r#"{"method":"Page.frameNavigated","params":{"frame":{}}}"#,
        )
        .await;
        assert!(pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn unparseable_frames_are_dropped() {
        let pending = new_pending();
        route_frame(&pending, "not json").await;
        assert!(pending.lock().await.is_empty());
    }

    #[test]
    fn command_omits_absent_session_id() {
        let command = Command {
            id: 1,
            method: "Browser.close",
            params: serde_json::json!({}),
            session_id: None,
        };
        let json = serde_json::to_value(&command).unwrap();
        assert!(json.get("sessionId").is_none());

        let command = Command {
            id: 2,
            method: "Page.navigate",
            params: serde_json::json!({"url": "https://example.com"}),
            session_id: Some("SESSION"),
        };
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["sessionId"], "SESSION");
    }
}
