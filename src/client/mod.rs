/// MCP Client Module
///
/// Client side of the tool server:
/// - types.rs: call request/result and tool descriptor shapes
/// - session.rs: JSON-RPC over HTTP session against an MCP endpoint
/// - invoker.rs: concurrent batch invocation and tool listing
///
/// The invoker talks to the server through the `ToolProvider` trait so tests
/// can substitute an in-memory provider for the HTTP session.

pub mod error;
pub mod invoker;
pub mod session;
pub mod types;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub use error::InvokeError;
pub use invoker::Invoker;
pub use session::{McpSession, DEFAULT_ENDPOINT};
pub use types::{Arguments, CallRequest, CallResult, FunctionCall, ToolDescriptor};

/// A remote registry of callable tools.
///
/// `open` and `close` bracket one unit of work. `call_tool` takes `&self` so
/// several calls can be in flight at once over the same provider.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    async fn open(&mut self) -> Result<(), InvokeError>;

    async fn close(&mut self);

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, InvokeError>;

    /// Call one tool. A tool that ran but reported an error comes back as
    /// `InvokeError::RemoteCallFailure`.
    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> Result<Value, InvokeError>;
}
