#![allow(dead_code)]

use anyhow::{bail, Result};
use lanerpc_core::RpcConfig;
use lanerpc_server::dispatch::{MethodDescriptor, MethodTable, RegistryError, RpcApi};
use lanerpc_server::{CallContext, OptionalParams, RpcServer};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub const SLOW_DELAY: Duration = Duration::from_millis(300);

pub struct MockApi;

impl MockApi {
    async fn method_a(self: Arc<Self>, _value: u64, fail: bool) -> Result<String> {
        if fail {
            bail!("mock_methodA error");
        }
        Ok("mock_methodA success".to_string())
    }

    async fn method_b(self: Arc<Self>, _value: String, fail: bool) -> Result<()> {
        if fail {
            bail!("mock_methodB error");
        }
        Ok(())
    }

    async fn method_c(self: Arc<Self>, _value: Value, fail: bool) -> Result<(&'static str, u64, bool)> {
        if fail {
            bail!("mock_methodC error");
        }
        Ok(("mock_methodC success", 15, true))
    }

    async fn method_d(self: Arc<Self>, _value: f64, fail: bool) -> Result<&'static str> {
        if fail {
            bail!("mock_methodD error");
        }
        Ok("0x010101")
    }

    async fn with_context(self: Arc<Self>, ctx: CallContext, _value: f64) -> Result<String> {
        Ok(ctx.trace_id().to_string())
    }

    async fn with_options(self: Arc<Self>, name: String, opts: OptionalParams) -> Result<(String, Value)> {
        Ok((name, Value::Object(opts.into_inner())))
    }

    async fn slow(self: Arc<Self>, id: u64) -> Result<u64> {
        tokio::time::sleep(SLOW_DELAY).await;
        Ok(id)
    }

    async fn fast(self: Arc<Self>, id: u64) -> Result<u64> {
        Ok(id)
    }

    async fn push(self: Arc<Self>, ctx: CallContext, count: u32) -> Result<u32> {
        let Some(connection) = ctx.connection() else {
            bail!("no connection");
        };
        for i in 0..count {
            let frame = json!({"jsonrpc": "2.0", "method": "pushed", "params": [i]});
            connection.send_raw(frame.to_string()).await?;
        }
        Ok(count)
    }

    async fn panics(self: Arc<Self>) -> Result<String> {
        panic!("mock panic");
    }
}

impl RpcApi for MockApi {
    fn register(table: &mut MethodTable<Self>) -> std::result::Result<(), RegistryError> {
        table
            .method("mock_methodA", MockApi::method_a)?
            .method("mock_methodB", MockApi::method_b)?
            .method("mock_methodC", MockApi::method_c)?
            .method("mock_methodD", MockApi::method_d)?
            .method("mock_withOptions", MockApi::with_options)?
            .method("mock_slow", MockApi::slow)?
            .method("mock_fast", MockApi::fast)?
            .method("mock_panics", MockApi::panics)?
            .method_with_context("mock_methodWithContext", MockApi::with_context)?
            .method_with_context("mock_push", MockApi::push)?;
        Ok(())
    }

    fn runtime_method(api: &Arc<Self>, name: &str) -> Option<MethodDescriptor> {
        if name != "mock_runtime_method" {
            return None;
        }
        Some(MethodDescriptor::new(
            name,
            api.clone(),
            |_api: Arc<MockApi>, _value: f64, fail: bool| async move {
                if fail {
                    bail!("mock_runtime_method error");
                }
                Ok("mock_runtime_method success")
            },
        ))
    }
}

pub fn test_config() -> RpcConfig {
    RpcConfig {
        port: 0,
        ..RpcConfig::default()
    }
}

pub async fn start_server() -> RpcServer {
    start_with(test_config()).await
}

pub async fn start_with(config: RpcConfig) -> RpcServer {
    RpcServer::start(config, Arc::new(MockApi))
        .await
        .expect("server should start")
}

pub fn http_url(server: &RpcServer) -> String {
    format!("http://127.0.0.1:{}/", server.local_addr().port())
}

pub fn ws_url(server: &RpcServer) -> String {
    format!("ws://127.0.0.1:{}/", server.local_addr().port())
}

/// Expected outcome of one call in the shared method table.
pub enum Expect {
    Result(Value),
    Error { code: i32, message: &'static str },
}

pub fn method_cases() -> Vec<(&'static str, Value, Expect)> {
    vec![
        ("mock_methodA", json!([60, false]), Expect::Result(json!("mock_methodA success"))),
        (
            "mock_methodA",
            json!([60, true]),
            Expect::Error { code: -32600, message: "mock_methodA error" },
        ),
        (
            "mock_methodA",
            json!([60, false, 500]),
            Expect::Error { code: -32602, message: "invalid params count" },
        ),
        (
            "mock_methodA",
            json!(["60", false]),
            Expect::Error { code: -32602, message: "invalid params" },
        ),
        ("mock_methodB", json!(["mock", false]), Expect::Result(json!(""))),
        (
            "mock_methodB",
            json!(["mock", true]),
            Expect::Error { code: -32600, message: "mock_methodB error" },
        ),
        (
            "mock_methodC",
            json!([{"key": [1, 2]}, false]),
            Expect::Result(json!(["mock_methodC success", 15, true])),
        ),
        ("mock_methodD", json!([60.5, false]), Expect::Result(json!("0x010101"))),
        (
            "mock_methodD",
            json!([true, false]),
            Expect::Error { code: -32602, message: "invalid params" },
        ),
        (
            "mock_runtime_method",
            json!([1, false]),
            Expect::Result(json!("mock_runtime_method success")),
        ),
        (
            "mock_runtime_method",
            json!([1, true]),
            Expect::Error { code: -32600, message: "mock_runtime_method error" },
        ),
        (
            "mock_notExisting",
            json!([]),
            Expect::Error { code: -32601, message: "method not found" },
        ),
        (
            "RuntimeMethod",
            json!(["mock_methodA"]),
            Expect::Error { code: -32601, message: "method not found: RuntimeMethod is reserved" },
        ),
    ]
}

pub fn params(value: Value) -> Vec<Value> {
    match value {
        Value::Array(params) => params,
        other => vec![other],
    }
}
