//! JSON-RPC 2.0 envelope types

pub mod error;
pub mod request;
pub mod response;

pub use error::{ErrorCode, JsonRpcError, ValidationError};
pub use request::{decode, Request};
pub use response::Response;

/// The only protocol version accepted on the wire.
pub const JSONRPC_VERSION: &str = "2.0";
