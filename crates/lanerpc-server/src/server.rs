//! Server lifecycle: bind, serve, and a close that waits for in-flight work.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, Method};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures::future::BoxFuture;
use lanerpc_core::RpcConfig;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::cors::{Any, CorsLayer};

use crate::dispatch::{Dispatcher, RegistryError, RpcApi};
use crate::metrics::RpcMetrics;
use crate::transport::{self, AppState, HealthCheck, Keepalive};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] lanerpc_core::Error),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

pub type Result<T> = std::result::Result<T, ServerError>;

type RouterHook = Box<dyn FnOnce(Router) -> Router + Send>;

pub struct ServerBuilder {
    config: RpcConfig,
    dispatcher: Dispatcher,
    health: Option<HealthCheck>,
    router_hook: Option<RouterHook>,
    keepalive: Keepalive,
}

impl ServerBuilder {
    pub fn new<A: RpcApi>(config: RpcConfig, api: Arc<A>) -> Result<Self> {
        config.validate()?;
        let dispatcher =
            Dispatcher::new(api)?.with_metrics(RpcMetrics::new(config.metrics.enabled));

        Ok(Self {
            config,
            dispatcher,
            health: None,
            router_hook: None,
            keepalive: Keepalive::default(),
        })
    }

    /// Serve the health-check path with `check` instead of an empty 200.
    pub fn health_check<F, Fut, R>(mut self, check: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse,
    {
        self.health = Some(Arc::new(move || -> BoxFuture<'static, Response> {
            let fut = check();
            Box::pin(async move { fut.await.into_response() })
        }));
        self
    }

    /// Customise the router, e.g. to add tower layers. Applied before CORS.
    pub fn map_router<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(Router) -> Router + Send + 'static,
    {
        self.router_hook = Some(Box::new(hook));
        self
    }

    pub fn keepalive(mut self, keepalive: Keepalive) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub async fn start(self) -> Result<RpcServer> {
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let dispatcher = Arc::new(self.dispatcher);
        let port = self.config.port;

        let state = AppState {
            dispatcher: dispatcher.clone(),
            config: Arc::new(self.config),
            keepalive: self.keepalive,
            shutdown: shutdown.clone(),
            tracker: tracker.clone(),
        };

        let health = self.health.unwrap_or_else(transport::default_health_check);
        let mut router = transport::routes(state, health);
        if let Some(hook) = self.router_hook {
            router = hook(router);
        }
        let router = router.layer(cors());

        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("JSON-RPC server listening on {}", local_addr);

        let serve_handle = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let result = axum::serve(
                    listener,
                    router.into_make_service_with_connect_info::<SocketAddr>(),
                )
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await;

                if let Err(e) = result {
                    tracing::error!("JSON-RPC server error: {}", e);
                }
            })
        };

        Ok(RpcServer {
            local_addr,
            dispatcher,
            shutdown,
            tracker,
            serve_handle,
        })
    }
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

/// A running server.
pub struct RpcServer {
    local_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    serve_handle: JoinHandle<()>,
}

impl RpcServer {
    pub fn builder<A: RpcApi>(config: RpcConfig, api: Arc<A>) -> Result<ServerBuilder> {
        ServerBuilder::new(config, api)
    }

    pub async fn start<A: RpcApi>(config: RpcConfig, api: Arc<A>) -> Result<Self> {
        Self::builder(config, api)?.start().await
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Signal shutdown and wait until every HTTP request, connection and
    /// dispatch has finished.
    pub async fn close(self) {
        tracing::info!("JSON-RPC server shutting down");

        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        if let Err(e) = self.serve_handle.await {
            tracing::error!("JSON-RPC server task failed: {}", e);
        }

        tracing::info!("JSON-RPC server stopped");
    }
}
