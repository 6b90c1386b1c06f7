/// Weather Tool
///
/// Current temperature for a place name. Geocodes the name with Open-Meteo,
/// then asks the Open-Meteo forecast API for the current weather at the first
/// match.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::core::server::{MCPTool, ToolHandler, ToolRegistry};
use crate::core::utils::error_payload;
use crate::tools::upstream::{ApiClient, ToolError, Upstream};

pub const TOOL_NAME: &str = "get_weather";

pub fn register(registry: &mut ToolRegistry, api: Arc<ApiClient>) {
    let tool = MCPTool {
        name: TOOL_NAME.to_string(),
        description: "Get current temperature for a given location using Open-Meteo API.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "Place name, e.g. \"Delhi, India\""
                }
            },
            "required": ["location"]
        }),
    };

    let handler: ToolHandler = Box::new(move |args: Value| -> BoxFuture<'static, Result<Value, String>> {
        let api = Arc::clone(&api);
        Box::pin(async move {
            let location = args
                .get("location")
                .and_then(|v| v.as_str())
                .ok_or_else(|| "Missing required parameter: location".to_string())?;
            get_weather(&api, location).await.map_err(|e| e.to_string())
        })
    });

    registry.register(tool, handler);
}

pub async fn get_weather(api: &ApiClient, location: &str) -> Result<Value, ToolError> {
    let geo_url = api.url(&api.endpoints.geocoding_base, &["v1", "search"], &[("name", location)])?;
    let geo = match api.get_json(geo_url).await? {
        Upstream::Json(body) => body,
        Upstream::Status(_) => return Ok(error_payload("Location geocoding failed.")),
    };

    let Some(place) = geo
        .get("results")
        .and_then(|v| v.as_array())
        .and_then(|results| results.first())
    else {
        return Ok(error_payload("Location not found."));
    };
    let latitude = coordinate(place, "latitude")?;
    let longitude = coordinate(place, "longitude")?;

    let (latitude, longitude) = (latitude.to_string(), longitude.to_string());
    let weather_url = api.url(
        &api.endpoints.forecast_base,
        &["v1", "forecast"],
        &[
            ("latitude", latitude.as_str()),
            ("longitude", longitude.as_str()),
            ("current_weather", "true"),
        ],
    )?;
    let weather = match api.get_json(weather_url).await? {
        Upstream::Json(body) => body,
        Upstream::Status(_) => return Ok(error_payload("Weather data fetch failed.")),
    };

    match weather
        .get("current_weather")
        .and_then(|current| current.get("temperature"))
        .filter(|t| !t.is_null())
    {
        Some(temperature) => Ok(serde_json::json!({
            "location": location,
            "temperature_celsius": temperature
        })),
        None => Ok(error_payload("Temperature data not available.")),
    }
}

fn coordinate(place: &Value, key: &str) -> Result<f64, ToolError> {
    place
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| ToolError::Unexpected(format!("geocoding result has no numeric {}", key)))
}
