use std::net::SocketAddr;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::{IntoResponse, Response};

use super::{connection, AppState};

/// Complete the upgrade and hand the socket to the connection loops.
///
/// The in-flight token is taken before the upgrade so that a shutdown
/// started in between still waits for the connection.
pub(crate) fn upgrade(
    state: AppState,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    peer: SocketAddr,
    trace_id: Option<String>,
) -> Response {
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            tracing::warn!(peer = %peer, "websocket upgrade rejected: {}", rejection);
            return rejection.into_response();
        }
    };

    let token = state.tracker.token();
    upgrade
        .on_failed_upgrade(move |e| {
            tracing::warn!(peer = %peer, "websocket upgrade failed: {}", e);
        })
        .on_upgrade(move |socket| async move {
            let _token = token;
            connection::serve(socket, peer, trace_id, state).await;
        })
}
