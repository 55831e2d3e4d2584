//! LaneRPC Daemon
//!
//! Serves the demo API over HTTP and WebSocket until interrupted.

use anyhow::Result;
use clap::Parser;
use lanerpc_core::storage::{init_config_dir, ConfigStorage};
use lanerpc_core::RpcConfig;
use lanerpc_server::RpcServer;
use std::path::PathBuf;
use std::sync::Arc;

mod demo;

#[derive(Parser, Debug)]
#[command(name = "lanerpcd")]
#[command(about = "LaneRPC daemon - JSON-RPC 2.0 over HTTP and WebSocket", long_about = None)]
struct Args {
    /// Config file (defaults to config.json in the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listening port, overrides the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    install_panic_hook();

    let config = load_config(&args)?;
    tracing::info!("LaneRPC daemon starting...");
    tracing::info!(
        "HTTP enabled: {}, WebSocket enabled: {}, healthcheck: {}",
        config.http.enabled,
        config.websocket.enabled,
        config.healthcheck_endpoint
    );

    if config.metrics.enabled {
        start_metrics_exporter(&config)?;
    }

    let server = RpcServer::start(config, Arc::new(demo::DemoApi::new())).await?;
    tracing::info!("Daemon ready and listening on {}", server.local_addr());

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    server.close().await;

    Ok(())
}

fn load_config(args: &Args) -> Result<RpcConfig> {
    let mut config = match &args.config {
        Some(path) => ConfigStorage::load_file(path)?,
        None => ConfigStorage::new(init_config_dir()?).load()?,
    };

    if let Some(port) = args.port {
        config.port = port;
    }
    config.validate()?;

    Ok(config)
}

/// Log panics with a backtrace of the panicking thread. The message
/// boundary turns them into error responses afterwards.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        tracing::error!("panic: {}\n{}", info, backtrace);
    }));
}

#[cfg(feature = "prometheus")]
fn start_metrics_exporter(config: &RpcConfig) -> Result<()> {
    let listen = config
        .metrics
        .listen
        .unwrap_or_else(|| std::net::SocketAddr::from(([0, 0, 0, 0], 9000)));
    lanerpc_server::metrics::install_prometheus(listen)
}

#[cfg(not(feature = "prometheus"))]
fn start_metrics_exporter(_config: &RpcConfig) -> Result<()> {
    tracing::warn!("Metrics are enabled but no exporter is compiled in (feature `prometheus`)");
    lanerpc_server::metrics::describe();
    Ok(())
}
