/// MCP Server Entry Point
///
/// Reads the server configuration from the environment, builds the tool
/// registry, and starts the selected transport.
///
/// Environment Variables:
/// - SERVER_NAME: Name of the server (default: "mcp-tool-gateway")
/// - SERVER_VERSION: Version string (default: crate version)
/// - MCP_TRANSPORT_MODE: "stdio", "http", or "both" (default: "http")
/// - HOST: Bind address for HTTP mode (default: "0.0.0.0")
/// - PORT: Port number for HTTP mode (default: 8000)
/// - IFSC_API_BASE, GEOCODING_API_BASE, FORECAST_API_BASE: upstream API bases
/// - UPSTREAM_TIMEOUT_SECS: outbound request timeout (default: 30)
/// - MCP_CONFIG: optional JSON file with per-tool settings
/// - RUST_LOG / LOG_FORMAT: log filter and "json" output

use std::sync::Arc;

use mcp_tool_gateway::core::{logging, server, utils::ServerConfig};
use mcp_tool_gateway::tools::upstream::ApiClient;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    logging::init();

    let config = ServerConfig::from_env();
    let api = ApiClient::from_env().map_err(std::io::Error::other)?;
    let registry = server::initialize_tools(Arc::new(api));

    match config.transport.as_str() {
        "stdio" => server::run_server_stdio(config, registry).await,
        "http" => server::run_server_http(config, registry).await,
        "both" => {
            // STDIO in the background, HTTP in the foreground
            let stdio_config = config.clone();
            let stdio_registry = Arc::clone(&registry);
            let stdio_handle = tokio::spawn(async move {
                if let Err(e) = server::run_server_stdio(stdio_config, stdio_registry).await {
                    tracing::error!(error = %e, "STDIO server error");
                }
            });

            let http_result = server::run_server_http(config, registry).await;

            // If HTTP server exits, abort STDIO task
            stdio_handle.abort();
            http_result
        }
        other => {
            tracing::error!(transport = other, "invalid transport mode, expected 'stdio', 'http', or 'both'");
            std::process::exit(1);
        }
    }
}
