use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ErrorCode, JsonRpcError, JSONRPC_VERSION};

/// An outbound reply. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub id: Value,
}

impl Response {
    /// A `null` result is replaced by `""` so that `result` is never omitted.
    pub fn success(result: Value, id: Value) -> Self {
        let result = if result.is_null() {
            Value::String(String::new())
        } else {
            result
        };

        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>, data: Option<Value>, id: Value) -> Self {
        Self::from_error(JsonRpcError::new(code, message, data), id)
    }

    pub fn from_error(error: JsonRpcError, id: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn to_json(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => format!(
                r#"{{"jsonrpc":"2.0","error":{{"code":{},"message":"internal error","data":"{}"}}}}"#,
                ErrorCode::InternalError.code(),
                e.to_string().replace('"', "'")
            ),
        }
    }
}
