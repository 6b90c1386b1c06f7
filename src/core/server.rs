/// MCP Server Implementation
///
/// This module contains the core MCP server implementation including:
/// - Tool registry for managing available tools
/// - HTTP server setup with Actix Web
/// - STDIO server implementation for line-based communication
/// - Request dispatch for MCP protocol methods, shared by both transports

use actix_web::{
    web, App, HttpServer, HttpResponse, Result,
    middleware::{Compress, Logger, DefaultHeaders},
};
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::core::jsonrpc::{self, codes, MCPRequest, MCPResponse};
use crate::core::utils::ServerConfig;
use crate::tools;
use crate::tools::upstream::ApiClient;

/// Application state shared across all worker threads in HTTP mode.
#[derive(Clone)]
pub struct AppState {
    /// Server name as reported in MCP initialize responses
    pub server_name: String,
    /// Server version string as reported in MCP initialize responses
    pub server_version: String,
}

/// MCP tool definition structure.
///
/// Each tool must have a unique name, description, and JSON schema defining
/// its input parameters. This structure is serialized when listing tools.
#[derive(Serialize, Debug, Clone)]
pub struct MCPTool {
    /// Unique tool identifier (e.g., "get_weather")
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema defining the tool's input parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Tool handler function type definition.
///
/// Tool handlers take JSON arguments and return a future resolving to either
/// a JSON result or an error string. Handlers and their futures must be Send
/// to run on any HTTP worker thread.
pub type ToolHandler = Box<dyn Fn(Value) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

/// Registry of available MCP tools.
///
/// The registry maintains a list of tool definitions for discovery and a
/// HashMap of tool names to their handler functions for execution.
pub struct ToolRegistry {
    /// List of all registered tools (for tools/list method)
    pub tools: Vec<MCPTool>,
    /// Map of tool names to their handler functions (for tools/call method)
    pub handlers: HashMap<String, ToolHandler>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    /// Register a tool with the registry.
    ///
    /// Registering a name twice replaces the earlier definition and handler.
    pub fn register(&mut self, tool: MCPTool, handler: ToolHandler) {
        let name = tool.name.clone();
        self.tools.retain(|t| t.name != name);
        self.tools.push(tool);
        self.handlers.insert(name, handler);
    }

    /// Start executing a tool. Returns None when the tool is not registered.
    pub fn call(&self, name: &str, arguments: Value) -> Option<BoxFuture<'static, Result<Value, String>>> {
        self.handlers.get(name).map(|handler| handler(arguments))
    }
}

/// Health check endpoint handler.
async fn health(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": state.server_name
    })))
}

/// MCP JSON-RPC request handler for HTTP mode.
///
/// Counts the request, parses the body, and routes it through `dispatch`.
/// Notifications are acknowledged with 202 and no body.
async fn mcp_handler(
    state: web::Data<AppState>,
    registry: web::Data<Arc<ToolRegistry>>,
    counter: web::Data<AtomicU64>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    // Only atomicity is needed, no ordering with other operations
    counter.fetch_add(1, Ordering::Relaxed);

    let request = match jsonrpc::parse_request(&body) {
        Ok(request) => request,
        Err(parse_error) => {
            tracing::warn!("rejected malformed JSON-RPC body");
            return Ok(HttpResponse::Ok().json(parse_error));
        }
    };

    match dispatch(&state, &registry, request).await {
        Some(response) => Ok(HttpResponse::Ok().json(response)),
        None => Ok(HttpResponse::Accepted().finish()),
    }
}

/// Metrics endpoint handler.
///
/// Returns the total number of JSON-RPC requests processed since server start.
async fn metrics_handler(counter: web::Data<AtomicU64>) -> Result<HttpResponse> {
    let count = counter.load(Ordering::Relaxed);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "requests_total": count,
        "status": "ok"
    })))
}

/// Server-Sent Events endpoint for tools discovery.
///
/// Emits a single event carrying every registered tool and the tool count.
async fn sse_tools_discovery(registry: web::Data<Arc<ToolRegistry>>) -> Result<HttpResponse> {
    use actix_web::http::header;

    let tools_data = serde_json::json!({
        "tools": registry.tools,
        "count": registry.tools.len()
    });

    // SSE event framing: "data: {json}\n\n"
    let sse_data = format!(
        "data: {}\n\n",
        serde_json::to_string(&tools_data).unwrap_or_else(|_| "{}".to_string())
    );

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(header::CacheControl(vec![
            header::CacheDirective::NoCache,
            header::CacheDirective::NoStore,
            header::CacheDirective::MustRevalidate,
        ]))
        // Disable nginx buffering
        .insert_header(("x-accel-buffering", "no"))
        .body(sse_data))
}

/// Route one JSON-RPC message to its method handler.
///
/// Returns None for notifications, which never get a response.
pub async fn dispatch(state: &AppState, registry: &ToolRegistry, req: MCPRequest) -> Option<MCPResponse> {
    if req.is_notification() {
        tracing::debug!(method = %req.method, "notification received");
        return None;
    }
    let id = req.id;

    if req.jsonrpc != "2.0" {
        return Some(MCPResponse::failure(
            id,
            codes::INVALID_REQUEST,
            format!("Unsupported jsonrpc version: {}", req.jsonrpc),
        ));
    }

    let response = match req.method.as_str() {
        "initialize" => handle_initialize(state, id),
        "ping" => MCPResponse::success(id, serde_json::json!({})),
        "tools/list" => handle_tools_list(registry, id),
        "tools/call" => handle_tools_call(registry, id, req.params).await,
        _ => MCPResponse::failure(id, codes::METHOD_NOT_FOUND, format!("Method not found: {}", req.method)),
    };
    Some(response)
}

/// Handle MCP initialize method.
///
/// Returns the protocol version, server capabilities, and server information.
fn handle_initialize(state: &AppState, id: Option<Value>) -> MCPResponse {
    MCPResponse::success(
        id,
        serde_json::json!({
            "protocolVersion": jsonrpc::PROTOCOL_VERSION,
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": state.server_name,
                "version": state.server_version
            }
        }),
    )
}

/// Handle MCP tools/list method.
fn handle_tools_list(registry: &ToolRegistry, id: Option<Value>) -> MCPResponse {
    MCPResponse::success(id, serde_json::json!({ "tools": registry.tools }))
}

/// Handle MCP tools/call method.
///
/// Looks up the named tool and awaits its handler. Handler failures become
/// an `isError` result rather than a JSON-RPC error; an unknown tool is a
/// JSON-RPC error.
async fn handle_tools_call(registry: &ToolRegistry, id: Option<Value>, params: Option<Value>) -> MCPResponse {
    let Some(tool_params) = params else {
        return MCPResponse::failure(id, codes::INVALID_PARAMS, "Invalid params");
    };

    let tool_name = tool_params.get("name").and_then(|v| v.as_str()).unwrap_or("");

    // Arguments default to an empty object
    let arguments = tool_params.get("arguments").cloned().unwrap_or(serde_json::json!({}));

    let Some(call) = registry.call(tool_name, arguments) else {
        return MCPResponse::failure(id, codes::METHOD_NOT_FOUND, format!("Unknown tool: {}", tool_name));
    };

    let started = std::time::Instant::now();
    let outcome = call.await;
    tracing::info!(
        tool = tool_name,
        ok = outcome.is_ok(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "tool call finished"
    );

    match outcome {
        Ok(result) => {
            let mut body = serde_json::json!({
                "content": [
                    {
                        "type": "text",
                        "text": serde_json::to_string(&result).unwrap_or_default()
                    }
                ],
                "isError": false
            });
            if result.is_object() {
                body["structuredContent"] = result;
            }
            MCPResponse::success(id, body)
        }
        Err(e) => MCPResponse::success(
            id,
            serde_json::json!({
                "content": [
                    {
                        "type": "text",
                        "text": format!("Error: {}", e)
                    }
                ],
                "isError": true
            }),
        ),
    }
}

/// Create the tool registry with every tool registered.
///
/// Add new tool registrations here following this pattern:
/// `tools::your_tool::register(&mut registry, Arc::clone(&api));`
pub fn initialize_tools(api: Arc<ApiClient>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    tools::ifsc::register(&mut registry, Arc::clone(&api));
    tools::weather::register(&mut registry, api);
    Arc::new(registry)
}

/// Register the HTTP routes. Expects `AppState`, `Arc<ToolRegistry>` and the
/// `AtomicU64` request counter as app data.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics_handler))
        .route("/sse", web::get().to(sse_tools_discovery))
        .route("/mcp", web::post().to(mcp_handler))
        .route("/mcp/", web::post().to(mcp_handler))
        .route("/", web::post().to(mcp_handler))
        .route("/", web::get().to(health));
}

/// Run the MCP server in HTTP mode.
///
/// The server is configured with:
/// - Worker threads: from `ServerConfig` (CPU count, max 16)
/// - Max connections: 10,000 concurrent connections
/// - Connection rate limit: 1,000 connections per second
/// - Keep-alive: 30 seconds
/// - Request timeout: 30 seconds
/// - Disconnect timeout: 2 seconds
/// - Shutdown timeout: 10 seconds
pub async fn run_server_http(config: ServerConfig, registry: Arc<ToolRegistry>) -> std::io::Result<()> {
    let bind_addr = format!("{}:{}", config.host, config.port);

    let app_state = web::Data::new(AppState {
        server_name: config.name.clone(),
        server_version: config.version.clone(),
    });
    let tool_registry = web::Data::new(registry);
    let request_count = web::Data::new(AtomicU64::new(0));

    tracing::info!(
        name = %config.name,
        version = %config.version,
        bind = %bind_addr,
        workers = config.workers,
        tools = tool_registry.tools.len(),
        "MCP server starting (HTTP mode)"
    );

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .app_data(tool_registry.clone())
            .app_data(request_count.clone())
            .wrap(Compress::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
            )
            // %r = request line, %s = status, %D = duration in milliseconds
            .wrap(Logger::new("%r %s %Dms"))
            .configure(routes)
    })
    .workers(config.workers)
    .max_connections(10000)
    .max_connection_rate(1000)
    .keep_alive(Duration::from_secs(30))
    .client_request_timeout(Duration::from_secs(30))
    .client_disconnect_timeout(Duration::from_secs(2))
    .shutdown_timeout(10)
    .bind(&bind_addr)?
    .run()
    .await
}

/// Run the MCP server in STDIO mode.
///
/// Reads JSON-RPC requests line-by-line from stdin and writes one response
/// line per request to stdout. Logging goes to stderr.
pub async fn run_server_stdio(config: ServerConfig, registry: Arc<ToolRegistry>) -> std::io::Result<()> {
    use tokio::io::{BufReader, BufWriter};

    tracing::info!(name = %config.name, version = %config.version, "MCP server starting (STDIO mode)");

    let app_state = AppState {
        server_name: config.name,
        server_version: config.version,
    };

    let stdin = BufReader::with_capacity(8192, tokio::io::stdin());
    let stdout = BufWriter::with_capacity(8192, tokio::io::stdout());
    serve_lines(&app_state, &registry, stdin, stdout).await
}

/// Line-delimited JSON-RPC loop behind the STDIO transport.
///
/// Requests are handled one at a time and the writer is flushed after each
/// response. Blank lines and notifications produce no output; a line that
/// does not parse is answered only when an id can be recovered from it.
pub async fn serve_lines<R, W>(
    state: &AppState,
    registry: &ToolRegistry,
    reader: R,
    mut writer: W,
) -> std::io::Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match jsonrpc::parse_request(line.as_bytes()) {
            Ok(req) => match dispatch(state, registry, req).await {
                Some(response) => response,
                None => continue,
            },
            Err(parse_error) => {
                tracing::warn!("parse error on input line");
                // Without an id there is nobody to answer
                if parse_error.id.is_none() {
                    continue;
                }
                parse_error
            }
        };

        let response_json = match serde_json::to_string(&response) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "error serializing response");
                continue;
            }
        };

        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}
