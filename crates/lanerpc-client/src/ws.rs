//! Persistent WebSocket connection with request/response correlation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use lanerpc_core::protocol::{Request, Response};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::{into_result, ClientError, Result, TRACE_ID_HEADER};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Pending = Arc<Mutex<HashMap<i64, oneshot::Sender<Response>>>>;

/// Frames that are not responses to a pending call are buffered up to this
/// many; further ones are dropped.
const NOTIFICATION_BUFFER: usize = 256;

/// The close frame the server sent, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

pub struct WsClient {
    writer: Mutex<SplitSink<WsStream, Message>>,
    pending: Pending,
    request_counter: AtomicI64,
    notifications: Mutex<Option<mpsc::Receiver<Value>>>,
    reader: Mutex<Option<JoinHandle<Option<CloseInfo>>>>,
}

impl WsClient {
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_trace_id(url, None).await
    }

    /// Connect, sending `traceid` on the upgrade request when given.
    pub async fn connect_with_trace_id(url: &str, trace_id: Option<&str>) -> Result<Self> {
        let mut request = url.into_client_request()?;
        if let Some(trace_id) = trace_id {
            let value = HeaderValue::from_str(trace_id)
                .map_err(|_| ClientError::InvalidTraceId(trace_id.to_string()))?;
            request.headers_mut().insert(TRACE_ID_HEADER, value);
        }

        let (stream, _) = connect_async(request).await?;
        let (writer, reader) = stream.split();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (notif_tx, notif_rx) = mpsc::channel(NOTIFICATION_BUFFER);
        let reader = tokio::spawn(read_frames(reader, pending.clone(), notif_tx));

        Ok(Self {
            writer: Mutex::new(writer),
            pending,
            request_counter: AtomicI64::new(1),
            notifications: Mutex::new(Some(notif_rx)),
            reader: Mutex::new(Some(reader)),
        })
    }

    pub async fn call(&self, method: impl Into<String>, params: Vec<Value>) -> Result<Value> {
        into_result(self.request(method, params).await?)
    }

    /// Send a request and wait for the response with the same id.
    pub async fn request(&self, method: impl Into<String>, params: Vec<Value>) -> Result<Response> {
        let id = self.request_counter.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = Request::new(method, params, id);
        if let Err(e) = self.send_text(serde_json::to_string(&request)?).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        rx.await.map_err(|_| ClientError::Closed)
    }

    /// Send a raw text frame; any reply arrives on the notification channel.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        let text: String = text.into();
        let mut writer = self.writer.lock().await;
        writer.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Frames that were not responses to a call. Can be taken once.
    pub async fn notifications(&self) -> Option<mpsc::Receiver<Value>> {
        self.notifications.lock().await.take()
    }

    pub async fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.close().await?;
        Ok(())
    }

    /// Wait until the server ends the connection.
    pub async fn closed(&self) -> Option<CloseInfo> {
        let handle = self.reader.lock().await.take()?;
        handle.await.ok().flatten()
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.get_mut().take() {
            handle.abort();
        }
    }
}

async fn read_frames(
    mut reader: SplitStream<WsStream>,
    pending: Pending,
    notifications: mpsc::Sender<Value>,
) -> Option<CloseInfo> {
    let mut close = None;

    while let Some(message) = reader.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text.as_str().to_string(),
            Ok(Message::Binary(data)) => String::from_utf8_lossy(&data).into_owned(),
            Ok(Message::Close(frame)) => {
                close = frame.map(|frame| CloseInfo {
                    code: u16::from(frame.code),
                    reason: frame.reason.as_str().to_string(),
                });
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!("WebSocket read failed: {}", e);
                break;
            }
        };

        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!("Ignoring non-JSON frame: {}", e);
                continue;
            }
        };

        let waiter = match value.get("id").and_then(Value::as_i64) {
            Some(id) => pending.lock().await.remove(&id),
            None => None,
        };

        match waiter {
            Some(tx) => match serde_json::from_value::<Response>(value) {
                Ok(response) => {
                    let _ = tx.send(response);
                }
                Err(e) => tracing::debug!("Malformed response frame: {}", e),
            },
            None => {
                if notifications.try_send(value).is_err() {
                    tracing::debug!("Notification dropped");
                }
            }
        }
    }

    // Fail every call still waiting.
    pending.lock().await.clear();
    close
}
