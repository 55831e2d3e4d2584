//! Methods served by the daemon out of the box.

use anyhow::{bail, Result};
use lanerpc_server::dispatch::{Json, MethodDescriptor, MethodTable, RegistryError, RpcApi};
use lanerpc_server::{CallContext, OptionalParams};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct DemoApi {
    started: Instant,
}

#[derive(Debug, Serialize)]
struct ServerInfo {
    name: &'static str,
    version: &'static str,
    uptime_secs: u64,
    verbose: bool,
}

impl DemoApi {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    async fn ping(self: Arc<Self>) -> Result<&'static str> {
        Ok("pong")
    }

    async fn echo(self: Arc<Self>, value: Value) -> Result<Value> {
        Ok(value)
    }

    async fn sleep(self: Arc<Self>, millis: u64) {
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    async fn whoami(self: Arc<Self>, ctx: CallContext) -> Result<(String, Option<String>)> {
        Ok((
            ctx.trace_id().to_string(),
            ctx.peer().map(|peer| peer.to_string()),
        ))
    }

    async fn info(self: Arc<Self>, opts: OptionalParams) -> Result<Json<ServerInfo>> {
        Ok(Json(ServerInfo {
            name: "lanerpcd",
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: self.started.elapsed().as_secs(),
            verbose: opts.get("verbose").and_then(Value::as_bool).unwrap_or(false),
        }))
    }

    /// Pushes `count` frames to the caller before answering.
    async fn countdown(self: Arc<Self>, ctx: CallContext, count: u32) -> Result<u32> {
        let Some(connection) = ctx.connection() else {
            bail!("countdown requires a websocket connection");
        };
        for n in (1..=count).rev() {
            let frame = serde_json::json!({"jsonrpc": "2.0", "method": "countdown", "params": [n]});
            connection.send_raw(frame.to_string()).await?;
        }
        Ok(count)
    }
}

impl Default for DemoApi {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcApi for DemoApi {
    fn register(table: &mut MethodTable<Self>) -> Result<(), RegistryError> {
        table
            .method("ping", DemoApi::ping)?
            .method("echo", DemoApi::echo)?
            .method("sleep", DemoApi::sleep)?
            .method("info", DemoApi::info)?
            .method_with_context("whoami", DemoApi::whoami)?
            .method_with_context("countdown", DemoApi::countdown)?;
        Ok(())
    }

    /// `math_add`, `math_sub`, `math_mul` and `math_div`.
    fn runtime_method(api: &Arc<Self>, name: &str) -> Option<MethodDescriptor> {
        let op = name.strip_prefix("math_")?;
        let apply: fn(f64, f64) -> Result<f64> = match op {
            "add" => |a, b| Ok(a + b),
            "sub" => |a, b| Ok(a - b),
            "mul" => |a, b| Ok(a * b),
            "div" => |a, b| {
                if b == 0.0 {
                    bail!("division by zero");
                }
                Ok(a / b)
            },
            _ => return None,
        };

        Some(MethodDescriptor::new(
            name,
            api.clone(),
            move |_api: Arc<DemoApi>, a: f64, b: f64| async move { apply(a, b) },
        ))
    }
}
