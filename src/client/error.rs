use serde_json::Value;
use thiserror::Error;

/// Errors raised by the invoker and its tool provider session.
///
/// `RemoteCallFailure` never escapes `Invoker::invoke`; it is folded into the
/// failing entry's result payload.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("malformed arguments for call {id}: {source}")]
    MalformedArguments {
        id: Value,
        #[source]
        source: serde_json::Error,
    },
    #[error("call {id} has an empty tool name")]
    InvalidRequest { id: Value },
    #[error("tool provider unavailable at {endpoint}: {source}")]
    UpstreamUnavailable {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("tool {tool} failed: {message}")]
    RemoteCallFailure { tool: String, message: String },
    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i32, message: String },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("tool provider session is not open")]
    NotConnected,
}
