use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Standard JSON-RPC 2.0 error codes. The set is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
}

impl ErrorCode {
    pub const fn code(self) -> i32 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -32700 => Some(ErrorCode::ParseError),
            -32600 => Some(ErrorCode::InvalidRequest),
            -32601 => Some(ErrorCode::MethodNotFound),
            -32602 => Some(ErrorCode::InvalidParams),
            -32603 => Some(ErrorCode::InternalError),
            _ => None,
        }
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Envelope validation failures, reported before any dispatch happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid jsonrpc version")]
    InvalidJsonRpcVersion,

    #[error("invalid jsonrpc id")]
    InvalidJsonRpcId,
}

/// The `error` member of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data,
        }
    }

    /// Body could not be decoded; `detail` is the decoder's message.
    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ParseError,
            "invalid request",
            Some(Value::String(detail.into())),
        )
    }

    pub fn invalid_request(error: ValidationError) -> Self {
        Self::new(
            ErrorCode::InvalidRequest,
            "invalid request",
            Some(Value::String(error.to_string())),
        )
    }

    pub fn method_not_found() -> Self {
        Self::new(ErrorCode::MethodNotFound, "method not found", None)
    }

    pub fn invalid_params_count() -> Self {
        Self::new(ErrorCode::InvalidParams, "invalid params count", None)
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InvalidParams,
            "invalid params",
            Some(Value::String(detail.into())),
        )
    }

    pub fn internal_error(detail: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalError,
            "internal error",
            detail.map(Value::String),
        )
    }

    /// A method ran and reported its own failure.
    pub fn application_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message, None)
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            Some(data) => write!(
                f,
                "code: {}, message: {}, data: {}",
                self.code, self.message, data
            ),
            None => write!(f, "code: {}, message: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for JsonRpcError {}
