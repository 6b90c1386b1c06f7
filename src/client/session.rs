/// MCP Client Session
///
/// JSON-RPC 2.0 over HTTP POST against a single MCP endpoint, the client half
/// of the server's HTTP transport. A session is opened with the `initialize`
/// handshake and the `notifications/initialized` notification, and closed
/// explicitly. Responses may come back as plain JSON or as a Server-Sent
/// Events stream; both are accepted.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::client::error::InvokeError;
use crate::client::types::ToolDescriptor;
use crate::client::ToolProvider;
use crate::core::jsonrpc::{MCPRequest, MCPResponse, PROTOCOL_VERSION};
use crate::core::utils;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000/mcp";

/// Header carrying the server-assigned session id, when the server uses one.
const SESSION_HEADER: &str = "mcp-session-id";

/// Upper bound on `tools/list` pages fetched for one listing.
pub const MAX_TOOL_PAGES: usize = 64;

struct OpenSession {
    session_id: Option<String>,
    protocol_version: String,
}

pub struct McpSession {
    http: reqwest::Client,
    endpoint: String,
    next_id: AtomicU64,
    open: Option<OpenSession>,
}

#[derive(Deserialize)]
struct ToolPage {
    #[serde(default)]
    tools: Vec<ToolDescriptor>,
    #[serde(rename = "nextCursor", default)]
    next_cursor: Option<String>,
}

impl McpSession {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, InvokeError> {
        let endpoint = endpoint.into();
        let http = reqwest::Client::builder()
            .user_agent(concat!("mcp-invoke/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| InvokeError::UpstreamUnavailable {
                endpoint: endpoint.clone(),
                source,
            })?;
        Ok(Self::with_client(http, endpoint))
    }

    /// Endpoint from `MCP_ENDPOINT`, defaulting to the local server.
    pub fn from_env() -> Result<Self, InvokeError> {
        Self::new(utils::get_env_var("MCP_ENDPOINT", DEFAULT_ENDPOINT))
    }

    pub fn with_client(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            next_id: AtomicU64::new(1),
            open: None,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Protocol version the server agreed to, once open.
    pub fn protocol_version(&self) -> Option<&str> {
        self.open.as_ref().map(|s| s.protocol_version.as_str())
    }

    fn request(&self, method: &str, params: Value) -> MCPRequest {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        MCPRequest::new(json!(id), method, params)
    }

    async fn post(&self, message: &MCPRequest, session_id: Option<&str>) -> Result<reqwest::Response, InvokeError> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(message);
        if let Some(session_id) = session_id {
            request = request.header(SESSION_HEADER, session_id);
        }
        request.send().await.map_err(|source| InvokeError::UpstreamUnavailable {
            endpoint: self.endpoint.clone(),
            source,
        })
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, InvokeError> {
        let open = self.open.as_ref().ok_or(InvokeError::NotConnected)?;
        let response = self.post(&self.request(method, params), open.session_id.as_deref()).await?;
        read_result(response).await
    }

    /// Best-effort DELETE of a server-issued session.
    async fn terminate(&self, session_id: &str) {
        let result = self
            .http
            .delete(&self.endpoint)
            .header(SESSION_HEADER, session_id)
            .send()
            .await;
        if let Err(e) = result {
            tracing::debug!(error = %e, "session termination failed");
        }
    }

    /// Send `notifications/initialized` for a freshly initialized session.
    async fn acknowledge(&self, session_id: Option<&str>) -> Result<(), InvokeError> {
        let ack = self
            .post(&MCPRequest::notification("notifications/initialized"), session_id)
            .await?;
        if !ack.status().is_success() {
            return Err(InvokeError::Protocol(format!(
                "initialized notification rejected with HTTP {}",
                ack.status()
            )));
        }
        Ok(())
    }
}

impl Drop for McpSession {
    /// A session dropped while open (e.g. its batch was cancelled) still has
    /// its server-side state released, if a runtime is around to do it.
    fn drop(&mut self) {
        let Some(session_id) = self.open.take().and_then(|open| open.session_id) else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let request = self
            .http
            .delete(&self.endpoint)
            .header(SESSION_HEADER, session_id);
        runtime.spawn(async move {
            let _ = request.send().await;
        });
    }
}

#[async_trait]
impl ToolProvider for McpSession {
    /// Always performs a fresh handshake. A session still open from an
    /// interrupted batch is terminated first.
    async fn open(&mut self) -> Result<(), InvokeError> {
        if self.open.is_some() {
            tracing::debug!(endpoint = %self.endpoint, "replacing stale session");
            self.close().await;
        }

        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "mcp-invoke",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        let response = self.post(&self.request("initialize", params), None).await?;
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let result = read_result(response).await?;
        let protocol_version = result
            .get("protocolVersion")
            .and_then(|v| v.as_str())
            .unwrap_or(PROTOCOL_VERSION)
            .to_string();

        if let Err(e) = self.acknowledge(session_id.as_deref()).await {
            if let Some(session_id) = &session_id {
                self.terminate(session_id).await;
            }
            return Err(e);
        }

        tracing::debug!(endpoint = %self.endpoint, %protocol_version, "session opened");
        self.open = Some(OpenSession {
            session_id,
            protocol_version,
        });
        Ok(())
    }

    async fn close(&mut self) {
        let Some(open) = self.open.take() else {
            return;
        };
        // Servers that issued a session id expect an explicit DELETE
        if let Some(session_id) = open.session_id {
            self.terminate(&session_id).await;
        }
        tracing::debug!(endpoint = %self.endpoint, "session closed");
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, InvokeError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();
        for _ in 0..MAX_TOOL_PAGES {
            let params = match &cursor {
                Some(cursor) => json!({ "cursor": cursor }),
                None => json!({}),
            };
            let result = self.rpc("tools/list", params).await?;
            let page: ToolPage = serde_json::from_value(result)
                .map_err(|e| InvokeError::Protocol(format!("invalid tools/list result: {}", e)))?;
            tools.extend(page.tools);
            match page.next_cursor.filter(|next| !next.is_empty()) {
                Some(next) if seen.insert(next.clone()) => cursor = Some(next),
                _ => return Ok(tools),
            }
        }
        Err(InvokeError::Protocol(format!(
            "tools/list did not finish within {} pages",
            MAX_TOOL_PAGES
        )))
    }

    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> Result<Value, InvokeError> {
        let result = self
            .rpc("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;
        if result.get("isError").and_then(|v| v.as_bool()).unwrap_or(false) {
            return Err(InvokeError::RemoteCallFailure {
                tool: name.to_string(),
                message: first_text(&result).unwrap_or("tool reported an error").to_string(),
            });
        }
        Ok(extract_data(result))
    }
}

async fn read_result(response: reqwest::Response) -> Result<Value, InvokeError> {
    let status = response.status();
    if !status.is_success() {
        return Err(InvokeError::Protocol(format!("tool provider answered HTTP {}", status)));
    }
    let is_event_stream = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream"));
    let body = response
        .text()
        .await
        .map_err(|e| InvokeError::Protocol(format!("could not read response body: {}", e)))?;

    let envelope = if is_event_stream {
        parse_event_stream(&body)?
    } else {
        serde_json::from_str::<MCPResponse>(&body)
            .map_err(|e| InvokeError::Protocol(format!("invalid JSON-RPC response: {}", e)))?
    };

    if let Some(error) = envelope.error {
        return Err(InvokeError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    envelope
        .result
        .ok_or_else(|| InvokeError::Protocol("response carried neither result nor error".to_string()))
}

/// Pick the JSON-RPC response out of an SSE body, skipping any server
/// notifications sent ahead of it.
fn parse_event_stream(body: &str) -> Result<MCPResponse, InvokeError> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str::<MCPResponse>(data.trim()).ok())
        .filter(|response| response.result.is_some() || response.error.is_some())
        .last()
        .ok_or_else(|| InvokeError::Protocol("event stream carried no JSON-RPC response".to_string()))
}

fn first_text(result: &Value) -> Option<&str> {
    result
        .get("content")
        .and_then(|v| v.as_array())
        .and_then(|items| items.iter().find(|item| item.get("type").and_then(|t| t.as_str()) == Some("text")))
        .and_then(|item| item.get("text"))
        .and_then(|text| text.as_str())
}

/// The payload of a successful `tools/call` result: `structuredContent` when
/// present, otherwise the first text item decoded as JSON (kept as a string
/// if it is not JSON).
fn extract_data(mut result: Value) -> Value {
    if let Some(structured) = result.get_mut("structuredContent").map(Value::take) {
        if !structured.is_null() {
            return structured;
        }
    }
    match first_text(&result) {
        Some(text) => serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;
    use std::time::Duration;

    use actix_web::{App, HttpRequest, HttpResponse, HttpServer, dev::ServerHandle, web};

    use crate::client::{CallRequest, Invoker};
    use crate::core::server::{initialize_tools, routes, AppState};
    use crate::tools::test_support::spawn_fake_upstream;

    /// Run the real server routes, backed by the fake upstream APIs.
    async fn spawn_gateway() -> (String, ServerHandle, ServerHandle) {
        let (api, upstream) = spawn_fake_upstream().await;
        let state = web::Data::new(AppState {
            server_name: "gateway-under-test".to_string(),
            server_version: "0.0.0".to_string(),
        });
        let registry = web::Data::new(initialize_tools(Arc::new(api)));
        let counter = web::Data::new(AtomicU64::new(0));

        let server = HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .app_data(registry.clone())
                .app_data(counter.clone())
                .configure(routes)
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .expect("bind gateway");
        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_rt::spawn(server);
        (format!("http://{}/mcp", addr), handle, upstream)
    }

    /// Minimal MCP endpoint that counts handshakes and session DELETEs.
    #[derive(Default)]
    struct FakeMcp {
        reject_initialized: bool,
        endless_cursors: bool,
        initializes: AtomicUsize,
        deletes: AtomicUsize,
    }

    async fn fake_post(fake: web::Data<FakeMcp>, body: web::Json<Value>) -> HttpResponse {
        let id = body.get("id").cloned().unwrap_or(Value::Null);
        match body["method"].as_str().unwrap_or_default() {
            "initialize" => {
                let n = fake.initializes.fetch_add(1, AtomicOrdering::SeqCst) + 1;
                HttpResponse::Ok()
                    .insert_header((SESSION_HEADER, format!("s{}", n)))
                    .json(json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "result": {"protocolVersion": PROTOCOL_VERSION, "capabilities": {}}
                    }))
            }
            "notifications/initialized" if fake.reject_initialized => HttpResponse::InternalServerError().finish(),
            "notifications/initialized" => HttpResponse::Accepted().finish(),
            "tools/list" => {
                let next = if fake.endless_cursors { json!(format!("page-{}", id)) } else { Value::Null };
                HttpResponse::Ok().json(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {"tools": [{"name": "t"}], "nextCursor": next}
                }))
            }
            _ => HttpResponse::BadRequest().finish(),
        }
    }

    async fn fake_delete(fake: web::Data<FakeMcp>, req: HttpRequest) -> HttpResponse {
        if req.headers().contains_key(SESSION_HEADER) {
            fake.deletes.fetch_add(1, AtomicOrdering::SeqCst);
        }
        HttpResponse::NoContent().finish()
    }

    async fn spawn_fake_mcp(fake: FakeMcp) -> (String, web::Data<FakeMcp>, ServerHandle) {
        let fake = web::Data::new(fake);
        let shared = fake.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(shared.clone())
                .service(
                    web::resource("/mcp")
                        .route(web::post().to(fake_post))
                        .route(web::delete().to(fake_delete)),
                )
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .expect("bind fake mcp");
        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_rt::spawn(server);
        (format!("http://{}/mcp", addr), fake, handle)
    }

    #[test]
    fn extract_data_prefers_structured_content() {
        let result = json!({
            "content": [{"type": "text", "text": "{\"a\": 1}"}],
            "structuredContent": {"a": 2}
        });
        assert_eq!(extract_data(result), json!({"a": 2}));
    }

    #[test]
    fn extract_data_falls_back_to_text() {
        let result = json!({"content": [{"type": "text", "text": "{\"a\": 1}"}]});
        assert_eq!(extract_data(result), json!({"a": 1}));

        let result = json!({"content": [{"type": "text", "text": "plain words"}]});
        assert_eq!(extract_data(result), json!("plain words"));

        assert_eq!(extract_data(json!({"content": []})), Value::Null);
    }

    #[test]
    fn event_stream_skips_notifications() {
        let body = concat!(
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\",\"params\":{}}\n\n",
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":3,\"result\":{\"ok\":true}}\n\n",
        );
        let response = parse_event_stream(body).unwrap();
        assert_eq!(response.id, Some(json!(3)));
        assert_eq!(response.result, Some(json!({"ok": true})));

        assert!(matches!(parse_event_stream("data: nope\n\n"), Err(InvokeError::Protocol(_))));
    }

    #[tokio::test]
    async fn calls_before_open_are_rejected() {
        let session = McpSession::new("http://127.0.0.1:9/mcp").unwrap();
        assert!(matches!(session.list_tools().await, Err(InvokeError::NotConnected)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_upstream_unavailable() {
        let mut session = McpSession::new("http://127.0.0.1:9/mcp").unwrap();
        let err = session.open().await.unwrap_err();
        assert!(matches!(err, InvokeError::UpstreamUnavailable { .. }), "{err}");
        assert!(!session.is_open());
    }

    #[actix_rt::test]
    async fn session_handshake_and_listing() {
        let (endpoint, gateway, upstream) = spawn_gateway().await;
        let mut session = McpSession::new(endpoint).unwrap();
        session.open().await.unwrap();
        assert_eq!(session.protocol_version(), Some(PROTOCOL_VERSION));

        let names: Vec<String> = session.list_tools().await.unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, ["fetch_ifsc_details", "get_weather"]);

        session.close().await;
        assert!(!session.is_open());
        gateway.stop(true).await;
        upstream.stop(true).await;
    }

    #[actix_rt::test]
    async fn batch_runs_end_to_end_with_per_call_failures() {
        let (endpoint, gateway, upstream) = spawn_gateway().await;
        let mut invoker = Invoker::new(McpSession::new(endpoint).unwrap());

        let mut ifsc_args = Map::new();
        ifsc_args.insert("ifsc_code".to_string(), json!("HDFC0000001"));
        let requests = vec![
            CallRequest::new(1, "fetch_ifsc_details", ifsc_args),
            CallRequest::new("w", "get_weather", r#"{"location": "Delhi, India"}"#),
            CallRequest::new(3, "get_weather", Map::new()),
            CallRequest::new(4, "no_such_tool", Map::new()),
        ];
        let results = invoker.invoke(&requests, None).await.unwrap();

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].tool_id, json!(1));
        assert_eq!(results[0].result["BANK"], json!("HDFC Bank"));
        assert_eq!(results[1].tool_id, json!("w"));
        assert_eq!(
            results[1].result,
            json!({"location": "Delhi, India", "temperature_celsius": 31.4})
        );
        // Tool-reported error and unknown tool are both folded into the entry
        assert_eq!(
            results[2].result,
            json!({"error": "tool get_weather failed: Error: Missing required parameter: location"})
        );
        assert_eq!(results[3].name, "no_such_tool");
        assert!(results[3].result["error"].as_str().unwrap().contains("Unknown tool: no_such_tool"));

        assert!(!invoker.provider().is_open());
        gateway.stop(true).await;
        upstream.stop(true).await;
    }

    #[actix_rt::test]
    async fn rejected_acknowledgement_terminates_the_session() {
        let (endpoint, fake, server) = spawn_fake_mcp(FakeMcp {
            reject_initialized: true,
            ..FakeMcp::default()
        })
        .await;
        let mut session = McpSession::new(endpoint).unwrap();

        let err = session.open().await.unwrap_err();
        assert!(matches!(err, InvokeError::Protocol(_)), "{err}");
        assert!(!session.is_open());
        assert_eq!(fake.deletes.load(AtomicOrdering::SeqCst), 1);
        server.stop(true).await;
    }

    #[actix_rt::test]
    async fn reopening_replaces_the_stale_session() {
        let (endpoint, fake, server) = spawn_fake_mcp(FakeMcp::default()).await;
        let mut session = McpSession::new(endpoint).unwrap();

        session.open().await.unwrap();
        session.open().await.unwrap();
        assert_eq!(fake.initializes.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(fake.deletes.load(AtomicOrdering::SeqCst), 1);

        session.close().await;
        assert_eq!(fake.deletes.load(AtomicOrdering::SeqCst), 2);
        server.stop(true).await;
    }

    #[actix_rt::test]
    async fn dropping_an_open_session_deletes_it() {
        let (endpoint, fake, server) = spawn_fake_mcp(FakeMcp::default()).await;
        let mut session = McpSession::new(endpoint).unwrap();
        session.open().await.unwrap();
        drop(session);

        for _ in 0..50 {
            if fake.deletes.load(AtomicOrdering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(fake.deletes.load(AtomicOrdering::SeqCst), 1);
        server.stop(true).await;
    }

    #[actix_rt::test]
    async fn endless_pagination_is_cut_off() {
        let (endpoint, fake, server) = spawn_fake_mcp(FakeMcp {
            endless_cursors: true,
            ..FakeMcp::default()
        })
        .await;
        let mut session = McpSession::new(endpoint).unwrap();
        session.open().await.unwrap();

        let err = session.list_tools().await.unwrap_err();
        assert!(matches!(err, InvokeError::Protocol(ref m) if m.contains("pages")), "{err}");

        session.close().await;
        assert_eq!(fake.deletes.load(AtomicOrdering::SeqCst), 1);
        server.stop(true).await;
    }
}
