//! Per-call context handed to methods that ask for it.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderMap;

use crate::transport::ConnectionHandle;

/// Request header carrying a caller-chosen trace id.
pub const TRACE_ID_HEADER: &str = "traceid";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    WebSocket,
    /// Calls made in-process, e.g. from tests.
    Internal,
}

#[derive(Debug, Clone)]
pub struct CallContext {
    trace_id: Arc<str>,
    transport: Transport,
    peer: Option<SocketAddr>,
    connection: Option<ConnectionHandle>,
}

impl CallContext {
    pub fn new(trace_id: impl Into<String>, transport: Transport) -> Self {
        Self {
            trace_id: Arc::from(trace_id.into()),
            transport,
            peer: None,
            connection: None,
        }
    }

    /// A context with a freshly generated trace id.
    pub fn generated(transport: Transport) -> Self {
        Self::new(new_trace_id(), transport)
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn with_connection(mut self, connection: ConnectionHandle) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// The WebSocket connection this call arrived on, usable for pushes.
    pub fn connection(&self) -> Option<&ConnectionHandle> {
        self.connection.as_ref()
    }
}

pub fn new_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// The `traceid` header value, if present and non-empty.
pub fn trace_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(TRACE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};

    #[test]
    fn test_trace_id_header_lookup_ignores_case() {
        let mut headers = HeaderMap::new();
        assert_eq!(trace_id_from_headers(&headers), None);

        let name = HeaderName::from_bytes(b"TraceId").unwrap();
        headers.insert(name, HeaderValue::from_static("abc-123"));
        assert_eq!(trace_id_from_headers(&headers).as_deref(), Some("abc-123"));

        headers.insert("traceid", HeaderValue::from_static("  "));
        assert_eq!(trace_id_from_headers(&headers), None);
    }

    #[test]
    fn test_generated_trace_ids_are_unique() {
        let a = CallContext::generated(Transport::Http);
        let b = CallContext::generated(Transport::Http);
        assert_ne!(a.trace_id(), b.trace_id());
        assert!(uuid::Uuid::parse_str(a.trace_id()).is_ok());
        assert!(a.connection().is_none());
        assert_eq!(a.transport(), Transport::Http);
    }
}
