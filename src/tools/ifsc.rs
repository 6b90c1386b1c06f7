/// IFSC Lookup Tool
///
/// Resolves an Indian Financial System Code to its bank branch details using
/// the Razorpay public IFSC API.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::core::server::{MCPTool, ToolHandler, ToolRegistry};
use crate::core::utils::error_payload;
use crate::tools::upstream::{ApiClient, ToolError, Upstream};

pub const TOOL_NAME: &str = "fetch_ifsc_details";

/// Register the IFSC lookup tool with the tool registry.
pub fn register(registry: &mut ToolRegistry, api: Arc<ApiClient>) {
    let tool = MCPTool {
        name: TOOL_NAME.to_string(),
        description: "Fetch IFSC code details from Razorpay public API.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "ifsc_code": {
                    "type": "string",
                    "description": "IFSC code, e.g. 'HDFC0000001'"
                }
            },
            "required": ["ifsc_code"]
        }),
    };

    let handler: ToolHandler = Box::new(move |args: Value| -> BoxFuture<'static, Result<Value, String>> {
        let api = Arc::clone(&api);
        Box::pin(async move {
            let ifsc_code = args
                .get("ifsc_code")
                .and_then(|v| v.as_str())
                .ok_or_else(|| "Missing required parameter: ifsc_code".to_string())?;
            fetch_ifsc_details(&api, ifsc_code).await.map_err(|e| e.to_string())
        })
    });

    registry.register(tool, handler);
}

/// Look up one IFSC code.
///
/// A 200 response is returned as-is; any other status becomes an error
/// payload carrying the status code.
pub async fn fetch_ifsc_details(api: &ApiClient, ifsc_code: &str) -> Result<Value, ToolError> {
    let url = api.url(&api.endpoints.ifsc_base, &[ifsc_code], &[])?;
    match api.get_json(url).await? {
        Upstream::Json(details) => Ok(details),
        Upstream::Status(status) => Ok(error_payload(format!(
            "Invalid IFSC code or request failed. Status code: {}",
            status.as_u16()
        ))),
    }
}
