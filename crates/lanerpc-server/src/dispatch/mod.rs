//! Dispatch engine
//!
//! Resolves a request's method name against the registered API, checks and
//! coerces the positional params, invokes the method and shapes its return
//! values into a response. Knows nothing about transports.

mod handler;
mod params;
mod registry;

pub use handler::{
    ContextHandler, Handler, IntoMethodResult, IntoOutput, Json, MethodError, MethodResult,
    Output, ParamSpec,
};
pub use params::{coerce, Arg, CoerceError, FromArg, OptionalParams, ParamKind};
pub use registry::{
    exported_name, Invoker, MethodDescriptor, MethodTable, RegistryError, RpcApi,
    RESERVED_METHOD,
};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use lanerpc_core::protocol::{ErrorCode, JsonRpcError, Request, Response};
use serde_json::{Map, Value};
use tracing::Instrument;

use crate::context::CallContext;
use crate::metrics::RpcMetrics;

type Resolver = Box<dyn Fn(&str) -> Option<MethodDescriptor> + Send + Sync>;

/// Read-only after construction; shared by every transport.
pub struct Dispatcher {
    methods: HashMap<String, Arc<MethodDescriptor>>,
    resolver: Resolver,
    metrics: RpcMetrics,
}

impl Dispatcher {
    pub fn new<A: RpcApi>(api: Arc<A>) -> Result<Self, RegistryError> {
        let mut table = MethodTable::new(api.clone());
        A::register(&mut table)?;
        tracing::debug!("Dispatcher initialized with {} methods", table.len());

        let resolver: Resolver = Box::new(move |name| A::runtime_method(&api, name));

        Ok(Self {
            methods: table.into_methods(),
            resolver,
            metrics: RpcMetrics::disabled(),
        })
    }

    pub fn with_metrics(mut self, metrics: RpcMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> RpcMetrics {
        self.metrics
    }

    /// Names of the statically registered methods, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.values().map(|m| m.name()).collect();
        names.sort_unstable();
        names
    }

    pub fn resolve(&self, method: &str) -> Result<Arc<MethodDescriptor>, JsonRpcError> {
        let name = exported_name(method);
        if name == RESERVED_METHOD {
            return Err(JsonRpcError::new(
                ErrorCode::MethodNotFound,
                format!("method not found: {} is reserved", RESERVED_METHOD),
                None,
            ));
        }

        if let Some(descriptor) = self.methods.get(&name) {
            return Ok(descriptor.clone());
        }

        (self.resolver)(method)
            .map(Arc::new)
            .ok_or_else(JsonRpcError::method_not_found)
    }

    /// Serve one request. Every outcome is timed, counted and logged under
    /// the call's trace id.
    pub async fn handle(&self, ctx: CallContext, request: Request) -> Response {
        let method = request.method.clone();
        let span = tracing::info_span!("rpc", trace_id = %ctx.trace_id(), method = %method);

        let started = Instant::now();
        let response = self.dispatch(ctx, request).instrument(span.clone()).await;
        let elapsed = started.elapsed();

        self.metrics.method_call(&method);
        span.in_scope(|| match &response.error {
            None => {
                self.metrics.request_duration(&method, elapsed);
                tracing::info!(duration = ?elapsed, "served {}", method);
            }
            Some(error) => {
                self.metrics.error();
                tracing::warn!(duration = ?elapsed, error = %error, "served {}", method);
            }
        });

        response
    }

    async fn dispatch(&self, ctx: CallContext, request: Request) -> Response {
        if let Err(e) = request.validate() {
            return Response::from_error(JsonRpcError::invalid_request(e), request.id);
        }

        let descriptor = match self.resolve(&request.method) {
            Ok(descriptor) => descriptor,
            Err(e) => return Response::from_error(e, request.id),
        };

        let args = match bind_params(&descriptor, request.params) {
            Ok(args) => args,
            Err(e) => return Response::from_error(e, request.id),
        };

        shape_result(descriptor.invoke(ctx, args).await, request.id)
    }
}

/// Check arity and coerce each wire value to its declared kind.
///
/// An omitted optional tail is bound as an empty map.
pub fn bind_params(
    descriptor: &MethodDescriptor,
    mut params: Vec<Value>,
) -> Result<Vec<Arg>, JsonRpcError> {
    let declared = descriptor.params();
    let tail_omitted = descriptor.has_optional_tail() && params.len() + 1 == declared.len();

    if params.len() != declared.len() && !tail_omitted {
        return Err(JsonRpcError::invalid_params_count());
    }
    if tail_omitted {
        params.push(Value::Object(Map::new()));
    }

    // Reported positions count the context parameter.
    let offset = usize::from(descriptor.takes_context());

    params
        .into_iter()
        .zip(declared)
        .enumerate()
        .map(|(i, (value, &kind))| {
            coerce(value, kind).map_err(|e| match e {
                CoerceError::Unsupported(_) => {
                    JsonRpcError::internal_error(Some("Invalid method definition".to_string()))
                }
                CoerceError::Mismatch { .. } => JsonRpcError::invalid_params(format!(
                    "Param [{}] can't be converted to {}",
                    i + offset,
                    kind
                )),
            })
        })
        .collect()
}

/// Turn a method's outcome into a response.
///
/// Application failures use `InvalidRequest` with the error text as message.
pub fn shape_result(result: MethodResult, id: Value) -> Response {
    match result {
        Ok(output) => Response::success(output.into_result(), id),
        Err(MethodError::Application(e)) => {
            Response::from_error(JsonRpcError::application_error(e.to_string()), id)
        }
        Err(e) => Response::from_error(JsonRpcError::internal_error(Some(e.to_string())), id),
    }
}
