//! HTTP and WebSocket adapters around the dispatcher.

mod connection;
mod http;
mod websocket;

pub use connection::{
    ConnectionError, ConnectionHandle, Keepalive, PING_PERIOD, PONG_WAIT, WRITE_WAIT,
};
pub use http::HealthCheck;
pub(crate) use http::default_health_check;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use futures::FutureExt;
use lanerpc_core::protocol::{self, JsonRpcError, Response};
use lanerpc_core::RpcConfig;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::context::CallContext;
use crate::dispatch::Dispatcher;

/// Shared by every handler and connection of one server.
#[derive(Clone)]
pub(crate) struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<RpcConfig>,
    pub keepalive: Keepalive,
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
}

pub(crate) fn routes(state: AppState, health: HealthCheck) -> Router {
    let health_path = state.config.healthcheck_endpoint.clone();
    let body_limit = match state.config.http.max_body_bytes {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .route("/", get(http::rpc).post(http::rpc))
        .route(
            &health_path,
            get(move || {
                let health = health.clone();
                async move { health().await }
            }),
        )
        .layer(body_limit)
        .with_state(state)
}

/// Decode one raw message and dispatch it.
///
/// This is the only place a panicking method is turned into a response
/// (`InternalError`, no data) instead of unwinding further.
pub async fn serve_message(dispatcher: &Dispatcher, ctx: CallContext, raw: &[u8]) -> Response {
    let request = match protocol::decode(raw) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(trace_id = %ctx.trace_id(), "failed to decode request: {}", e);
            return Response::from_error(JsonRpcError::parse_error(e.to_string()), Value::Null);
        }
    };

    let id = request.id.clone();
    let trace_id = ctx.trace_id().to_string();

    match AssertUnwindSafe(dispatcher.handle(ctx, request))
        .catch_unwind()
        .await
    {
        Ok(response) => response,
        Err(panic) => {
            tracing::error!(
                trace_id = %trace_id,
                panic = %panic_message(panic.as_ref()),
                "recovered from panic while serving request"
            );
            dispatcher.metrics().error();
            Response::from_error(JsonRpcError::internal_error(None), id)
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
