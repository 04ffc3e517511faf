//! Wire envelopes and transport tags.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Where a request came in. Used as a metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// JSON REST under `/api`
    Api,
    /// Server-rendered HTML
    Explorer,
    /// Native JSON-over-WebSocket RPC
    WebSocket,
    /// Socket.IO RPC
    SocketIo,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Api => "api",
            Transport::Explorer => "explorer",
            Transport::WebSocket => "websocket",
            Transport::SocketIo => "socketio",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound WebSocket RPC. `id` is opaque and echoed verbatim.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WsRequest {
    #[serde(default)]
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Outbound WebSocket frame: a method response or a subscription push.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WsResponse {
    pub id: String,
    pub data: Value,
}

/// `{"error":{"message":...}}`
pub fn error_data(message: &str) -> Value {
    serde_json::json!({ "error": { "message": message } })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let req: WsRequest = serde_json::from_str(r#"{"method":"ping"}"#).unwrap();
        assert_eq!(req.id, "");
        assert_eq!(req.params, Value::Null);
    }

    #[test]
    fn test_error_envelope() {
        let res = WsResponse {
            id: "7".into(),
            data: error_data("Transaction 'not a tx' not found"),
        };
        assert_eq!(
            serde_json::to_string(&res).unwrap(),
            r#"{"id":"7","data":{"error":{"message":"Transaction 'not a tx' not found"}}}"#
        );
    }
}
