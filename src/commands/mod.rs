//! Request handlers
//!
//! The request-facing boundary of the recorder. Every handler answers with a
//! [`CommandResponse`] so callers get `{"success": true, ...}` or
//! `{"success": false, "error": ..., "code": ...}` instead of a Rust error.

pub mod recording;

use crate::utils::{ErrorResponse, RecorderError, RecorderResult};
use serde::Serialize;
use serde_json::{Map, Value};

/// Structured answer to a request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl CommandResponse {
    /// Success carrying `payload`; objects are flattened, other values land
    /// under `"value"`
    pub fn ok<T: Serialize>(payload: T) -> Self {
        match serde_json::to_value(payload) {
            Ok(Value::Object(payload)) => Self {
                success: true,
                payload,
            },
            Ok(Value::Null) => Self::ok_empty(),
            Ok(value) => {
                let mut payload = Map::new();
                payload.insert("value".to_string(), value);
                Self {
                    success: true,
                    payload,
                }
            }
            Err(e) => Self::failure(&RecorderError::from(e)),
        }
    }

    pub fn ok_empty() -> Self {
        Self {
            success: true,
            payload: Map::new(),
        }
    }

    pub fn failure(error: &RecorderError) -> Self {
        let ErrorResponse { code, message } = ErrorResponse::from(error);
        let mut payload = Map::new();
        payload.insert("error".to_string(), Value::String(message));
        payload.insert("code".to_string(), Value::String(code));
        Self {
            success: false,
            payload,
        }
    }

    pub fn from_result<T: Serialize>(result: RecorderResult<T>) -> Self {
        match result {
            Ok(payload) => Self::ok(payload),
            Err(e) => {
                tracing::warn!("Request failed: {}", e);
                Self::failure(&e)
            }
        }
    }

    /// Error code of a failed response
    pub fn code(&self) -> Option<&str> {
        self.payload.get("code").and_then(Value::as_str)
    }

    pub fn to_json(&self) -> Value {
        let mut object = self.payload.clone();
        object.insert("success".to_string(), Value::Bool(self.success));
        Value::Object(object)
    }
}
