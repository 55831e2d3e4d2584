use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{ValidationError, JSONRPC_VERSION};

/// An inbound call.
///
/// Missing `jsonrpc`, `method` and `id` members decode to empty values so that
/// [`Request::validate`] reports them instead of the decoder. A member of the
/// wrong JSON type (for example `"params": {}`) is a decode error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "jsonrpc", default)]
    pub version: String,
    #[serde(default)]
    pub method: String,
    #[serde(default, deserialize_with = "nullable_params")]
    pub params: Vec<Value>,
    #[serde(default)]
    pub id: Value,
}

fn nullable_params<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Strictly decode one request. Unknown members are ignored.
pub fn decode(bytes: &[u8]) -> Result<Request, serde_json::Error> {
    serde_json::from_slice(bytes)
}

impl Request {
    pub fn new(method: impl Into<String>, params: Vec<Value>, id: impl Into<Value>) -> Self {
        Self {
            version: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: id.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version != JSONRPC_VERSION {
            return Err(ValidationError::InvalidJsonRpcVersion);
        }

        match self.id {
            Value::String(_) | Value::Number(_) => Ok(()),
            _ => Err(ValidationError::InvalidJsonRpcId),
        }
    }
}
