//! MCP Tool Gateway
//!
//! An MCP (Model Context Protocol) tool server exposing IFSC bank-code and
//! weather lookups, plus a client that invokes batches of tool calls against
//! such a server concurrently.
//!
//! - core: JSON-RPC types, server transports, configuration, logging
//! - tools: the tool implementations registered with the server
//! - client: MCP session and the batch invoker

pub mod client;
pub mod core;
pub mod tools;
