/// Utility Functions for Configuration and Environment Management
///
/// Configuration comes from environment variables, optionally overridden per
/// tool by a JSON file named in `MCP_CONFIG`. The file is organized with a
/// "tools" section containing tool-specific settings.

use std::collections::HashMap;
use std::str::FromStr;

use serde_json::Value;

/// Load configuration from the JSON file named by `MCP_CONFIG`.
///
/// Returns an empty configuration when the variable is unset. A file that
/// cannot be read or parsed is logged and treated as empty.
///
/// # Example
/// ```json
/// {
///   "tools": {
///     "fetch_ifsc_details": { "base_url": "https://ifsc.razorpay.com" },
///     "get_weather": { "geocoding_base_url": "https://geocoding-api.open-meteo.com" }
///   }
/// }
/// ```
pub fn load_config() -> HashMap<String, Value> {
    let Ok(path) = std::env::var("MCP_CONFIG") else {
        return HashMap::new();
    };
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(%path, error = %e, "could not read config file");
            return HashMap::new();
        }
    };
    parse_config(&raw).unwrap_or_else(|e| {
        tracing::warn!(%path, error = %e, "could not parse config file");
        HashMap::new()
    })
}

fn parse_config(raw: &str) -> Result<HashMap<String, Value>, serde_json::Error> {
    serde_json::from_str(raw)
}

/// Get tool-specific configuration from the loaded configuration.
///
/// # Arguments
/// * `tool_name` - Name of the tool to get configuration for (e.g., "get_weather")
///
/// # Returns
/// The tool's settings, or an empty map if the tool has no configuration.
pub fn get_tool_config(tool_name: &str) -> HashMap<String, Value> {
    tool_section(&load_config(), tool_name)
}

fn tool_section(config: &HashMap<String, Value>, tool_name: &str) -> HashMap<String, Value> {
    // config -> tools -> tool_name
    config
        .get("tools")
        .and_then(|v| v.as_object())
        .and_then(|tools| tools.get(tool_name))
        .and_then(|v| v.as_object())
        .map(|tool_config| {
            tool_config
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Get environment variable value with a default fallback.
///
/// # Example
/// ```ignore
/// let endpoint = get_env_var("MCP_ENDPOINT", "http://127.0.0.1:8000/mcp");
/// ```
pub fn get_env_var(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get and parse an environment variable, falling back to `default` when it
/// is unset or does not parse.
pub fn get_env_parsed<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

/// Build the `{"error": message}` payload that tools and the invoker return
/// in place of a result.
pub fn error_payload(message: impl Into<String>) -> Value {
    serde_json::json!({ "error": message.into() })
}

/// Server settings read from the environment.
///
/// Environment Variables:
/// - SERVER_NAME: Name of the server (default: "mcp-tool-gateway")
/// - SERVER_VERSION: Version string (default: crate version)
/// - MCP_TRANSPORT_MODE: "stdio", "http", or "both" (default: "http")
/// - HOST: Bind address for HTTP mode (default: "0.0.0.0")
/// - PORT: Port number for HTTP mode (default: 8000)
/// - WORKER_THREADS: HTTP worker count (default: CPU count, max 16)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            name: get_env_var("SERVER_NAME", "mcp-tool-gateway"),
            version: get_env_var("SERVER_VERSION", env!("CARGO_PKG_VERSION")),
            transport: get_env_var("MCP_TRANSPORT_MODE", "http"),
            host: get_env_var("HOST", "0.0.0.0"),
            port: get_env_parsed("PORT", 8000),
            // Capped at 16 to avoid excessive context switching
            workers: get_env_parsed("WORKER_THREADS", num_cpus::get().clamp(1, 16)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_section_reads_nested_settings() {
        let config = parse_config(r#"{"tools": {"get_weather": {"geocoding_base_url": "http://geo"}}}"#).unwrap();
        let section = tool_section(&config, "get_weather");
        assert_eq!(section.get("geocoding_base_url"), Some(&json!("http://geo")));
        assert!(tool_section(&config, "fetch_ifsc_details").is_empty());
    }

    #[test]
    fn tool_section_tolerates_missing_tools_key() {
        let config = parse_config(r#"{"other": 1}"#).unwrap();
        assert!(tool_section(&config, "get_weather").is_empty());
    }

    #[test]
    fn error_payload_shape() {
        assert_eq!(error_payload("boom"), json!({"error": "boom"}));
    }

    #[test]
    fn unparsable_env_value_falls_back() {
        assert_eq!(get_env_parsed::<u16>("MCP_TOOL_GATEWAY_SURELY_UNSET", 42), 42);
    }
}
