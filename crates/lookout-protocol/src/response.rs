//! Outbound CDP messages: responses and notifications.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC style error codes used by CDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ServerError,
}

impl ErrorCode {
    /// Numeric value sent on the wire.
    pub fn code(self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::ServerError => -32000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
}

/// Answer to a request; exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    /// Successful response with an empty result object.
    pub fn ok(id: i64) -> Self {
        Self {
            id,
            result: Some(Value::Object(serde_json::Map::new())),
            error: None,
        }
    }

    /// Successful response carrying `result`.
    ///
    /// A result that fails to serialize turns into an `InternalError`
    /// response so the request is still answered.
    pub fn with_result<T: Serialize>(id: i64, result: &T) -> Self {
        match serde_json::to_value(result) {
            Ok(value) => Self {
                id,
                result: Some(value),
                error: None,
            },
            Err(e) => Self::error(id, ErrorCode::InternalError, e.to_string()),
        }
    }

    pub fn error(id: i64, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(ResponseError {
                code: code.code(),
                message: message.into(),
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Server-initiated message without an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub method: String,
    pub params: Value,
}

impl Notification {
    pub fn new<T: Serialize>(method: &str, params: &T) -> Self {
        Self {
            method: method.to_string(),
            params: serde_json::to_value(params)
                .unwrap_or_else(|_| Value::Object(serde_json::Map::new())),
        }
    }

    /// Notification with an empty params object.
    pub fn empty(method: &str) -> Self {
        Self {
            method: method.to_string(),
            params: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_error_codes() {
        assert_eq!(ErrorCode::MethodNotFound.code(), -32601);
        assert_eq!(ErrorCode::InvalidRequest.code(), -32600);
        assert_eq!(ErrorCode::InternalError.code(), -32603);
        assert_eq!(ErrorCode::ServerError.code(), -32000);
    }

    #[test]
    fn response_ok_has_empty_result() {
        let json: Value = serde_json::from_str(&Response::ok(4).to_json()).unwrap();
        assert_eq!(json, json!({"id": 4, "result": {}}));
    }

    #[test]
    fn response_error_shape() {
        let resp = Response::error(2, ErrorCode::MethodNotFound, "Foo.bar wasn't found");
        assert!(resp.is_error());
        let json: Value = serde_json::from_str(&resp.to_json()).unwrap();
        assert_eq!(
            json,
            json!({"id": 2, "error": {"code": -32601, "message": "Foo.bar wasn't found"}})
        );
    }

    #[test]
    fn response_with_result_serializes_payload() {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Usage {
            used_size: f64,
        }
        let resp = Response::with_result(8, &Usage { used_size: 12.0 });
        assert_eq!(resp.result, Some(json!({"usedSize": 12.0})));
    }

    #[test]
    fn notification_has_no_id() {
        let note = Notification::empty("Debugger.resumed");
        let json: Value = serde_json::from_str(&note.to_json()).unwrap();
        assert_eq!(json, json!({"method": "Debugger.resumed", "params": {}}));
    }
}
