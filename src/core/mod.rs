/// Core Server Framework Module
///
/// This module contains the core server implementation including:
/// - jsonrpc.rs: JSON-RPC 2.0 envelope types shared with the client
/// - server.rs: MCP server implementation with HTTP and STDIO transport
/// - utils.rs: Configuration and utility functions
/// - logging.rs: tracing subscriber setup

pub mod jsonrpc;
pub mod logging;
pub mod server;
pub mod utils;
