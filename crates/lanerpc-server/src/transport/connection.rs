//! WebSocket connection loops.
//!
//! One read loop, one write loop and one task per inbound frame. The write
//! loop is the only writer of the socket; everything else reaches it through
//! the bounded outbound queue.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use lanerpc_core::protocol::Response;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use super::{serve_message, AppState};
use crate::context::{new_trace_id, CallContext, Transport};

/// Time allowed to read the next frame from the peer.
pub const PONG_WAIT: Duration = Duration::from_secs(60);
/// Send pings at this period. Must be less than `PONG_WAIT`.
pub const PING_PERIOD: Duration = Duration::from_secs(54);
/// Time allowed to write a frame to the peer.
pub const WRITE_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection closed")]
    Closed,

    #[error("Write timed out")]
    WriteTimeout,

    #[error("WebSocket error: {0}")]
    Socket(#[from] axum::Error),
}

pub type Result<T> = std::result::Result<T, ConnectionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keepalive {
    pub ping_period: Duration,
    pub pong_wait: Duration,
    pub write_wait: Duration,
}

impl Default for Keepalive {
    fn default() -> Self {
        Self {
            ping_period: PING_PERIOD,
            pong_wait: PONG_WAIT,
            write_wait: WRITE_WAIT,
        }
    }
}

/// Cloneable write side of one connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    peer: SocketAddr,
    outbound: mpsc::Sender<String>,
}

impl ConnectionHandle {
    pub(crate) fn new(peer: SocketAddr, capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (outbound, rx) = mpsc::channel(capacity);
        (
            Self {
                id: Uuid::new_v4(),
                peer,
                outbound,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub async fn send(&self, response: &Response) -> Result<()> {
        self.send_raw(response.to_json()).await
    }

    /// Queue a text frame. Waits while the queue is full and fails once the
    /// writer has stopped.
    pub async fn send_raw(&self, frame: impl Into<String>) -> Result<()> {
        self.outbound
            .send(frame.into())
            .await
            .map_err(|_| ConnectionError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

/// Why the read loop stopped.
#[derive(Debug)]
enum ReadEnd {
    Shutdown,
    Eof,
    Closed(Option<u16>),
    TimedOut,
    Failed(axum::Error),
}

impl ReadEnd {
    fn is_unexpected(&self) -> bool {
        match self {
            ReadEnd::Closed(Some(code)) => !matches!(
                *code,
                close_code::NORMAL | close_code::AWAY | close_code::STATUS | close_code::ABNORMAL
            ),
            ReadEnd::TimedOut => true,
            _ => false,
        }
    }
}

pub(crate) async fn serve(
    socket: WebSocket,
    peer: SocketAddr,
    trace_id: Option<String>,
    state: AppState,
) {
    let (handle, outbound) =
        ConnectionHandle::new(peer, state.config.websocket.send_queue_capacity);
    let connection = handle.id();
    let metrics = state.dispatcher.metrics();
    metrics.connection_opened();
    tracing::debug!(connection = %connection, peer = %peer, "websocket connection opened");

    let (sink, mut stream) = socket.split();
    let done = CancellationToken::new();
    let stop_reading = CancellationToken::new();
    let dispatches = TaskTracker::new();

    let writer = tokio::spawn(
        WriteLoop {
            sink,
            outbound,
            keepalive: state.keepalive,
            shutdown: state.shutdown.clone(),
            done: done.clone(),
            stop_reading: stop_reading.clone(),
            dispatches: dispatches.clone(),
            connection,
        }
        .run(),
    );

    let end = read_loop(
        &mut stream,
        &handle,
        &state,
        &dispatches,
        &stop_reading,
        trace_id.as_deref(),
    )
    .await;
    dispatches.close();
    done.cancel();
    drop(handle);

    match &end {
        end if end.is_unexpected() => {
            tracing::error!(connection = %connection, "websocket closed unexpectedly: {:?}", end);
        }
        ReadEnd::Failed(e) => {
            tracing::debug!(connection = %connection, "websocket read failed: {}", e);
        }
        end => {
            tracing::debug!(connection = %connection, "websocket read loop finished: {:?}", end);
        }
    }

    // The socket is closed here and only here.
    match writer.await {
        Ok(mut sink) => {
            if let Err(e) = sink.close().await {
                tracing::debug!(connection = %connection, "websocket close: {}", e);
            }
            drop(stream);
        }
        Err(e) => {
            tracing::error!(connection = %connection, "websocket writer task failed: {}", e);
        }
    }

    metrics.connection_closed();
    tracing::debug!(connection = %connection, "websocket connection closed");
}

async fn read_loop(
    stream: &mut SplitStream<WebSocket>,
    handle: &ConnectionHandle,
    state: &AppState,
    dispatches: &TaskTracker,
    stop: &CancellationToken,
    trace_id: Option<&str>,
) -> ReadEnd {
    loop {
        // The deadline is re-armed by every frame, pongs included.
        let next = tokio::select! {
            biased;
            _ = stop.cancelled() => return ReadEnd::Shutdown,
            next = timeout(state.keepalive.pong_wait, stream.next()) => next,
        };

        let payload = match next {
            Err(_) => return ReadEnd::TimedOut,
            Ok(None) => return ReadEnd::Eof,
            Ok(Some(Err(e))) => return ReadEnd::Failed(e),
            Ok(Some(Ok(Message::Text(text)))) => text.as_str().as_bytes().to_vec(),
            Ok(Some(Ok(Message::Binary(data)))) => data.to_vec(),
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
            Ok(Some(Ok(Message::Close(frame)))) => {
                return ReadEnd::Closed(frame.map(|frame| frame.code))
            }
        };

        let trace_id = trace_id.map(str::to_string).unwrap_or_else(new_trace_id);
        let ctx = CallContext::new(trace_id, Transport::WebSocket)
            .with_peer(handle.peer())
            .with_connection(handle.clone());
        let dispatcher = state.dispatcher.clone();
        let handle = handle.clone();

        state.tracker.spawn(dispatches.track_future(async move {
            dispatcher.metrics().websocket_request();
            let response = serve_message(&dispatcher, ctx, &payload).await;
            if let Err(e) = handle.send(&response).await {
                tracing::debug!(connection = %handle.id(), "dropping response: {}", e);
            }
        }));
    }
}

struct WriteLoop {
    sink: SplitSink<WebSocket, Message>,
    outbound: mpsc::Receiver<String>,
    keepalive: Keepalive,
    shutdown: CancellationToken,
    done: CancellationToken,
    stop_reading: CancellationToken,
    dispatches: TaskTracker,
    connection: Uuid,
}

impl WriteLoop {
    async fn run(mut self) -> SplitSink<WebSocket, Message> {
        let period = self.keepalive.ping_period;
        let mut ping = interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    self.drain().await;
                    break;
                }
                _ = self.done.cancelled() => break,
                _ = ping.tick() => {
                    if let Err(e) = self.write(Message::Ping(Bytes::new())).await {
                        tracing::debug!(connection = %self.connection, "failed to write ping: {}", e);
                        break;
                    }
                }
                frame = self.outbound.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = self.write(Message::Text(frame.into())).await {
                            tracing::warn!(connection = %self.connection, "failed to write frame: {}", e);
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        // Nobody is left to write, so the read side has no reason to go on.
        self.stop_reading.cancel();
        self.sink
    }

    /// Flush everything in-flight dispatches produce, then close normally.
    async fn drain(&mut self) {
        self.stop_reading.cancel();

        loop {
            tokio::select! {
                biased;
                frame = self.outbound.recv() => match frame {
                    Some(frame) => {
                        if self.write(Message::Text(frame.into())).await.is_err() {
                            return;
                        }
                    }
                    None => break,
                },
                _ = self.dispatches.wait() => break,
            }
        }

        while let Ok(frame) = self.outbound.try_recv() {
            if self.write(Message::Text(frame.into())).await.is_err() {
                return;
            }
        }

        let close = Message::Close(Some(CloseFrame {
            code: close_code::NORMAL,
            reason: Utf8Bytes::from_static("Server closing connection"),
        }));
        if let Err(e) = self.write(close).await {
            tracing::debug!(connection = %self.connection, "failed to send close frame: {}", e);
        }
    }

    async fn write(&mut self, message: Message) -> Result<()> {
        match timeout(self.keepalive.write_wait, self.sink.send(message)).await {
            Ok(result) => result.map_err(ConnectionError::from),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:9".parse().unwrap()
    }

    #[test]
    fn test_keepalive_defaults() {
        let keepalive = Keepalive::default();
        assert_eq!(keepalive.pong_wait, Duration::from_secs(60));
        assert_eq!(keepalive.ping_period, Duration::from_secs(54));
        assert_eq!(keepalive.write_wait, Duration::from_secs(2));
        assert!(keepalive.ping_period < keepalive.pong_wait);
    }

    #[test]
    fn test_close_classification() {
        assert!(!ReadEnd::Shutdown.is_unexpected());
        assert!(!ReadEnd::Eof.is_unexpected());
        assert!(!ReadEnd::Closed(None).is_unexpected());
        for code in [1000, 1001, 1005, 1006] {
            assert!(!ReadEnd::Closed(Some(code)).is_unexpected(), "code {}", code);
        }
        assert!(ReadEnd::Closed(Some(1002)).is_unexpected());
        assert!(ReadEnd::Closed(Some(4000)).is_unexpected());
        assert!(ReadEnd::TimedOut.is_unexpected());
    }

    #[tokio::test]
    async fn test_handle_queue_is_bounded() {
        let (handle, mut rx) = ConnectionHandle::new(peer(), 2);
        handle.send_raw("one").await.unwrap();
        handle.send_raw("two").await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), handle.send_raw("three")).await;
        assert!(blocked.is_err(), "third send should wait for capacity");

        assert_eq!(rx.recv().await.as_deref(), Some("one"));
        handle.send_raw("three").await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("two"));
        assert_eq!(rx.recv().await.as_deref(), Some("three"));
    }

    #[tokio::test]
    async fn test_handle_fails_after_writer_stops() {
        let (handle, rx) = ConnectionHandle::new(peer(), 4);
        drop(rx);
        assert!(handle.is_closed());
        assert!(matches!(
            handle.send_raw("late").await,
            Err(ConnectionError::Closed)
        ));
    }

    struct EchoApi;

    impl EchoApi {
        async fn echo(self: std::sync::Arc<Self>, value: u64) -> anyhow::Result<u64> {
            Ok(value)
        }
    }

    impl crate::dispatch::RpcApi for EchoApi {
        fn register(
            table: &mut crate::dispatch::MethodTable<Self>,
        ) -> std::result::Result<(), crate::dispatch::RegistryError> {
            table.method("echo", EchoApi::echo)?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_connection_gauge_follows_open_sockets() {
        use crate::metrics::testing::TestRecorder;
        use crate::metrics::{REQUEST_WEBSOCKET, WEBSOCKET_CONNECTIONS};
        use crate::server::RpcServer;
        use tokio_tungstenite::tungstenite::Message as ClientMessage;

        let recorder = TestRecorder::default();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let mut config = lanerpc_core::RpcConfig {
            port: 0,
            ..Default::default()
        };
        config.metrics.enabled = true;
        let server = RpcServer::start(config, std::sync::Arc::new(EchoApi))
            .await
            .unwrap();
        let url = format!("ws://127.0.0.1:{}/", server.local_addr().port());

        let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        let request = r#"{"jsonrpc":"2.0","method":"echo","params":[7],"id":1}"#;
        socket
            .send(ClientMessage::Text(request.into()))
            .await
            .unwrap();
        let reply = loop {
            match socket.next().await {
                Some(Ok(ClientMessage::Text(text))) => break text,
                Some(Ok(_)) => continue,
                other => panic!("no reply: {:?}", other),
            }
        };
        assert!(reply.as_str().contains(r#""result":7"#));
        assert_eq!(recorder.gauge(WEBSOCKET_CONNECTIONS), 1.0);
        assert_eq!(recorder.counter(REQUEST_WEBSOCKET), 1);

        socket.close(None).await.unwrap();
        server.close().await;
        assert_eq!(recorder.gauge(WEBSOCKET_CONNECTIONS), 0.0);
    }
}
