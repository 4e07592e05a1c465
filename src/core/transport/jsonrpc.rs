//! JSON-RPC 2.0 envelopes.
//!
//! Inbound bodies are classified into requests, notifications and client
//! responses. Only requests produce an answer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Missing, unknown or closed session.
pub const SESSION_ERROR: i32 = -32000;
/// Bearer token missing or rejected.
pub const AUTH_ERROR: i32 = -32001;

/// JSON-RPC request structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC notification: a request without an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC response structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Method not found error.
    pub fn method_not_found(id: Value, method: &str) -> Self {
        Self::error(id, METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    /// Invalid request error.
    pub fn invalid_request(id: Value, msg: impl Into<String>) -> Self {
        Self::error(id, INVALID_REQUEST, msg)
    }

    /// Invalid params error.
    pub fn invalid_params(id: Value, msg: impl Into<String>) -> Self {
        Self::error(id, INVALID_PARAMS, msg)
    }

    /// Internal error.
    pub fn internal_error(id: Value, msg: impl Into<String>) -> Self {
        Self::error(id, INTERNAL_ERROR, msg)
    }

    /// Error code, if this is an error response.
    pub fn error_code(&self) -> Option<i32> {
        self.error.as_ref().map(|e| e.code)
    }
}

impl JsonRpcNotification {
    /// Create a notification.
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: Some(params),
        }
    }
}

/// One element of an inbound body.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    /// A client's answer to a server-initiated request.
    Response(Value),
    /// Well-formed JSON that is not a JSON-RPC message.
    Invalid { id: Value, reason: String },
}

impl InboundMessage {
    /// Classify one JSON value.
    pub fn classify(value: Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::Invalid {
                id: Value::Null,
                reason: "message must be a JSON object".to_string(),
            };
        };

        let id = object.get("id").cloned().unwrap_or(Value::Null);
        if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Self::Invalid {
                id,
                reason: "jsonrpc must be \"2.0\"".to_string(),
            };
        }

        let has_method = object.contains_key("method");
        let has_id = object.get("id").is_some_and(|id| !id.is_null());

        if has_method && has_id {
            match serde_json::from_value(value) {
                Ok(request) => Self::Request(request),
                Err(e) => Self::Invalid {
                    id,
                    reason: e.to_string(),
                },
            }
        } else if has_method {
            match serde_json::from_value(value) {
                Ok(notification) => Self::Notification(notification),
                Err(e) => Self::Invalid {
                    id,
                    reason: e.to_string(),
                },
            }
        } else if object.contains_key("result") || object.contains_key("error") {
            Self::Response(value)
        } else {
            Self::Invalid {
                id,
                reason: "message has neither method nor result".to_string(),
            }
        }
    }
}

/// A parsed POST body.
#[derive(Debug, Clone)]
pub struct InboundBody {
    pub messages: Vec<InboundMessage>,
    pub is_batch: bool,
}

impl InboundBody {
    /// Parse raw bytes; `Err` carries the parse failure message.
    pub fn parse(bytes: &[u8]) -> Result<Self, String> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        Ok(match value {
            Value::Array(items) => Self {
                messages: items.into_iter().map(InboundMessage::classify).collect(),
                is_batch: true,
            },
            single => Self {
                messages: vec![InboundMessage::classify(single)],
                is_batch: false,
            },
        })
    }

    /// Whether any message expects an answer.
    pub fn expects_response(&self) -> bool {
        self.messages.iter().any(|m| {
            matches!(
                m,
                InboundMessage::Request(_) | InboundMessage::Invalid { .. }
            )
        })
    }

    /// Whether the body carries an `initialize` request.
    pub fn is_initialize(&self) -> bool {
        self.messages
            .iter()
            .any(|m| matches!(m, InboundMessage::Request(r) if r.method == "initialize"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_request_notification_and_response() {
        let body = InboundBody::parse(
            br#"[
                {"jsonrpc":"2.0","id":1,"method":"ping"},
                {"jsonrpc":"2.0","method":"notifications/initialized"},
                {"jsonrpc":"2.0","id":"srv-1","result":{}}
            ]"#,
        )
        .unwrap();

        assert!(body.is_batch);
        assert!(matches!(body.messages[0], InboundMessage::Request(_)));
        assert!(matches!(body.messages[1], InboundMessage::Notification(_)));
        assert!(matches!(body.messages[2], InboundMessage::Response(_)));
        assert!(body.expects_response());
    }

    #[test]
    fn test_notifications_only_expect_no_response() {
        let body =
            InboundBody::parse(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .unwrap();
        assert!(!body.is_batch);
        assert!(!body.expects_response());
    }

    #[test]
    fn test_wrong_version_is_invalid_but_keeps_id() {
        let message = InboundMessage::classify(json!({"jsonrpc":"1.0","id":7,"method":"ping"}));
        let InboundMessage::Invalid { id, .. } = message else {
            panic!("expected invalid message");
        };
        assert_eq!(id, json!(7));
    }

    #[test]
    fn test_non_json_is_a_parse_failure() {
        assert!(InboundBody::parse(b"{not json").is_err());
    }

    #[test]
    fn test_error_response_omits_result() {
        let response = JsonRpcResponse::error(json!(1), SESSION_ERROR, "Session not found");
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"Session not found"}})
        );
    }
}
