/// JSON-RPC 2.0 Envelope Types
///
/// Request, response and error structures for the MCP protocol. The server
/// deserializes requests and serializes responses; the client does the reverse,
/// so every type here derives both directions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version reported by `initialize` and requested by the client.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC error codes used by the server.
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
}

/// JSON-RPC 2.0 request structure for MCP protocol.
///
/// The jsonrpc field must be "2.0", id is optional (None for notifications),
/// method specifies the MCP method to call, and params contains
/// method-specific parameters.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MCPRequest {
    /// JSON-RPC version identifier, must be "2.0"
    pub jsonrpc: String,
    /// Request ID for correlating responses. None indicates a notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// MCP method name (e.g., "initialize", "tools/list", "tools/call")
    pub method: String,
    /// Method-specific parameters as JSON value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl MCPRequest {
    pub fn new(id: Value, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: method.to_string(),
            params: Some(params),
        }
    }

    pub fn notification(method: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: method.to_string(),
            params: None,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 response structure for MCP protocol.
///
/// Responses carry either a result or an error, never both.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MCPResponse {
    /// JSON-RPC version identifier, always "2.0"
    pub jsonrpc: String,
    /// Request ID from the original request
    pub id: Option<Value>,
    /// Response result, present when request succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error information, present when request failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<MCPError>,
}

impl MCPResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(MCPError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// JSON-RPC 2.0 error structure.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MCPError {
    /// JSON-RPC error code (e.g., -32601 for method not found)
    pub code: i32,
    /// Human-readable error message
    pub message: String,
    /// Optional additional error data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Parse one raw JSON-RPC message.
///
/// On failure, returns the parse error response to send back. The id is
/// salvaged from the raw text when it is at least valid JSON.
pub fn parse_request(raw: &[u8]) -> Result<MCPRequest, MCPResponse> {
    serde_json::from_slice::<MCPRequest>(raw).map_err(|e| {
        let id = serde_json::from_slice::<Value>(raw)
            .ok()
            .and_then(|partial| partial.get("id").cloned());
        MCPResponse::failure(id, codes::PARSE_ERROR, format!("Parse error: {}", e))
    })
}
