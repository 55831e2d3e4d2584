//! LaneRPC Client Library
//!
//! Calls a LaneRPC server over HTTP, one request per call, or over a
//! persistent WebSocket connection that correlates responses by id.

mod ws;

pub use ws::{CloseInfo, WsClient};

use lanerpc_core::protocol::{JsonRpcError, Request, Response};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};

pub use lanerpc_core::protocol;

/// Request header carrying the caller's trace id.
pub const TRACE_ID_HEADER: &str = "traceid";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i32,
        message: String,
        data: Option<Value>,
    },

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Invalid trace id: {0}")]
    InvalidTraceId(String),

    #[error("Connection closed")]
    Closed,
}

impl ClientError {
    /// The JSON-RPC error code, for `Rpc` errors.
    pub fn rpc_code(&self) -> Option<i32> {
        match self {
            ClientError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<JsonRpcError> for ClientError {
    fn from(error: JsonRpcError) -> Self {
        ClientError::Rpc {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// The `result` of a response, or its error as `ClientError::Rpc`.
pub fn into_result(response: Response) -> Result<Value> {
    match response.error {
        Some(error) => Err(error.into()),
        None => Ok(response.result.unwrap_or(Value::Null)),
    }
}

/// A decoded reply together with its HTTP status.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub response: Response,
}

/// Posts each call as its own HTTP request.
pub struct HttpClient {
    url: String,
    http: reqwest::Client,
    trace_id: Option<String>,
    request_counter: AtomicI64,
}

impl HttpClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
            trace_id: None,
            request_counter: AtomicI64::new(1),
        }
    }

    /// Send `traceid` with every request.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub async fn call(&self, method: impl Into<String>, params: Vec<Value>) -> Result<Value> {
        into_result(self.request(method, params).await?.response)
    }

    pub async fn request(&self, method: impl Into<String>, params: Vec<Value>) -> Result<HttpReply> {
        let request = Request::new(method, params, self.next_id());
        self.send_body(serde_json::to_vec(&request)?).await
    }

    /// Post a raw body. Error statuses still decode when the body is a
    /// JSON-RPC response; otherwise the status is the error.
    pub async fn send_body(&self, body: impl Into<reqwest::Body>) -> Result<HttpReply> {
        let mut builder = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(trace_id) = &self.trace_id {
            builder = builder.header(TRACE_ID_HEADER, trace_id);
        }

        let reply = builder.send().await?;
        let status = reply.status().as_u16();
        let bytes = reply.bytes().await?;

        match serde_json::from_slice::<Response>(&bytes) {
            Ok(response) => Ok(HttpReply { status, response }),
            Err(e) => {
                tracing::debug!("Non JSON-RPC reply with status {}: {}", status, e);
                Err(ClientError::Status(status))
            }
        }
    }

    fn next_id(&self) -> i64 {
        self.request_counter.fetch_add(1, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanerpc_core::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_into_result_success() {
        let response = Response::success(json!([1, 2]), json!(1));
        assert_eq!(into_result(response).unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_into_result_error() {
        let response = Response::error(ErrorCode::MethodNotFound, "method not found", None, json!(1));
        let err = into_result(response).unwrap_err();
        assert_eq!(err.rpc_code(), Some(-32601));
        assert_eq!(err.to_string(), "RPC error -32601: method not found");
    }

    #[test]
    fn test_request_ids_increase() {
        let client = HttpClient::new("http://127.0.0.1:1/");
        assert_eq!(client.next_id(), 1);
        assert_eq!(client.next_id(), 2);
    }
}
