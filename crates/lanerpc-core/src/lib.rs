//! LaneRPC core
//!
//! Wire-level JSON-RPC 2.0 types and the server configuration model, shared by
//! the server and the client crates.

pub mod error;
pub mod models;
pub mod protocol;
pub mod storage;

pub use error::{Error, Result};
pub use models::RpcConfig;
pub use protocol::{ErrorCode, JsonRpcError, Request, Response, ValidationError};
