//! LaneRPC server library
//!
//! Serves the methods of an [`RpcApi`] as JSON-RPC 2.0 over HTTP and
//! WebSocket on a single listening port.

pub mod context;
pub mod dispatch;
pub mod metrics;
pub mod server;
pub mod transport;

pub use context::{CallContext, Transport, TRACE_ID_HEADER};
pub use dispatch::{Dispatcher, MethodDescriptor, MethodTable, OptionalParams, RegistryError, RpcApi};
pub use server::{RpcServer, ServerBuilder, ServerError};
pub use transport::{ConnectionHandle, Keepalive};
