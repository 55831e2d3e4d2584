use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use lanerpc_core::protocol::{JsonRpcError, Response as RpcResponse};
use serde_json::Value;

use super::{serve_message, websocket, AppState};
use crate::context::{new_trace_id, trace_id_from_headers, CallContext, Transport};

/// Produces the response for the health-check path.
pub type HealthCheck = Arc<dyn Fn() -> BoxFuture<'static, Response> + Send + Sync>;

pub(crate) fn default_health_check() -> HealthCheck {
    Arc::new(|| -> BoxFuture<'static, Response> {
        Box::pin(async { StatusCode::OK.into_response() })
    })
}

/// `GET /` and `POST /`: either a WebSocket upgrade or one JSON-RPC call.
pub(crate) async fn rpc(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let _in_flight = state.tracker.token();
    let trace_id = trace_id_from_headers(&headers);

    if is_websocket_upgrade(&headers) {
        if !state.config.websocket.enabled {
            return StatusCode::NOT_FOUND.into_response();
        }
        return websocket::upgrade(state, upgrade, peer, trace_id);
    }

    if !state.config.http.enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    let dispatcher = state.dispatcher.clone();
    dispatcher.metrics().http_request();

    let ctx = CallContext::new(trace_id.unwrap_or_else(new_trace_id), Transport::Http)
        .with_peer(peer);
    let response = match body {
        Ok(body) => serve_message(&dispatcher, ctx, &body).await,
        Err(rejection) => {
            tracing::debug!(
                trace_id = %ctx.trace_id(),
                "failed to read request body: {}",
                rejection
            );
            let error = JsonRpcError::parse_error(rejection.body_text());
            RpcResponse::from_error(error, Value::Null)
        }
    };

    let status = if response.is_success() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };

    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        response.to_json(),
    )
        .into_response()
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
}
