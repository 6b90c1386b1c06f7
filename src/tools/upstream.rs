/// Upstream HTTP Client
///
/// Shared outbound client for tools that forward to third-party JSON APIs.
/// One `reqwest::Client` is built at startup and reused by every tool call.

use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde_json::Value;
use thiserror::Error;

use crate::core::utils;

pub const DEFAULT_IFSC_BASE: &str = "https://ifsc.razorpay.com";
pub const DEFAULT_GEOCODING_BASE: &str = "https://geocoding-api.open-meteo.com";
pub const DEFAULT_FORECAST_BASE: &str = "https://api.open-meteo.com";

/// Failures that turn a tool call into an `isError` result.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid upstream url {url}: {reason}")]
    BadUrl { url: String, reason: String },
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected upstream response: {0}")]
    Unexpected(String),
}

/// Base URLs of the third-party APIs.
#[derive(Debug, Clone)]
pub struct UpstreamEndpoints {
    pub ifsc_base: String,
    pub geocoding_base: String,
    pub forecast_base: String,
}

impl Default for UpstreamEndpoints {
    fn default() -> Self {
        Self {
            ifsc_base: DEFAULT_IFSC_BASE.to_string(),
            geocoding_base: DEFAULT_GEOCODING_BASE.to_string(),
            forecast_base: DEFAULT_FORECAST_BASE.to_string(),
        }
    }
}

impl UpstreamEndpoints {
    /// Resolve endpoints from the per-tool config file first, then the
    /// `IFSC_API_BASE`, `GEOCODING_API_BASE` and `FORECAST_API_BASE`
    /// environment variables, then the public defaults.
    pub fn from_env() -> Self {
        let ifsc = utils::get_tool_config("fetch_ifsc_details");
        let weather = utils::get_tool_config("get_weather");
        let pick = |section: &std::collections::HashMap<String, Value>, key: &str, env: &str, default: &str| {
            section
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| utils::get_env_var(env, default))
        };

        Self {
            ifsc_base: pick(&ifsc, "base_url", "IFSC_API_BASE", DEFAULT_IFSC_BASE),
            geocoding_base: pick(&weather, "geocoding_base_url", "GEOCODING_API_BASE", DEFAULT_GEOCODING_BASE),
            forecast_base: pick(&weather, "forecast_base_url", "FORECAST_API_BASE", DEFAULT_FORECAST_BASE),
        }
    }
}

/// Outcome of a GET against an upstream API.
#[derive(Debug)]
pub enum Upstream {
    /// HTTP 200 with a JSON body
    Json(Value),
    /// Any other status
    Status(StatusCode),
}

pub struct ApiClient {
    http: reqwest::Client,
    pub endpoints: UpstreamEndpoints,
}

impl ApiClient {
    pub fn new(endpoints: UpstreamEndpoints, timeout: Duration) -> Result<Self, ToolError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mcp-tool-gateway/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, endpoints })
    }

    /// Build from environment; `UPSTREAM_TIMEOUT_SECS` defaults to 30.
    pub fn from_env() -> Result<Self, ToolError> {
        let timeout = Duration::from_secs(utils::get_env_parsed("UPSTREAM_TIMEOUT_SECS", 30));
        Self::new(UpstreamEndpoints::from_env(), timeout)
    }

    /// Join `segments` onto `base` as escaped path segments and append the
    /// query pairs.
    pub fn url(&self, base: &str, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, ToolError> {
        let bad_url = |reason: String| ToolError::BadUrl { url: base.to_string(), reason };
        let mut url = Url::parse(base).map_err(|e| bad_url(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| bad_url("cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    pub async fn get_json(&self, url: Url) -> Result<Upstream, ToolError> {
        tracing::debug!(%url, "upstream GET");
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            tracing::debug!(%status, "upstream returned non-200");
            return Ok(Upstream::Status(status));
        }
        Ok(Upstream::Json(response.json::<Value>().await?))
    }
}
