//! Call request/result shapes exchanged with the invoker's callers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One requested tool call, as produced by a model's function-calling output.
///
/// ```json
/// {"id": 1, "function": {"name": "lookup", "arguments": {"code": "X"}}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    /// Opaque identifier, copied to the matching result
    pub id: Value,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Arguments,
}

/// Call arguments, either as a JSON object or as a string holding one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Arguments {
    Map(Map<String, Value>),
    Encoded(String),
}

impl Default for Arguments {
    fn default() -> Self {
        Arguments::Map(Map::new())
    }
}

impl Arguments {
    /// Decode into a JSON object. An encoded string must hold an object.
    pub fn decode(&self) -> Result<Map<String, Value>, serde_json::Error> {
        match self {
            Arguments::Map(map) => Ok(map.clone()),
            Arguments::Encoded(raw) => serde_json::from_str(raw),
        }
    }
}

impl From<Map<String, Value>> for Arguments {
    fn from(map: Map<String, Value>) -> Self {
        Arguments::Map(map)
    }
}

impl CallRequest {
    pub fn new(id: impl Into<Value>, name: impl Into<String>, arguments: impl Into<Arguments>) -> Self {
        Self {
            id: id.into(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

impl From<String> for Arguments {
    fn from(raw: String) -> Self {
        Arguments::Encoded(raw)
    }
}

impl From<&str> for Arguments {
    fn from(raw: &str) -> Self {
        Arguments::Encoded(raw.to_string())
    }
}

/// Outcome of one call, positionally matching its request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    pub tool_id: Value,
    /// Tool name as dispatched, including any namespace prefix
    pub name: String,
    /// Tool payload, or `{"error": ...}` when the call failed
    pub result: Value,
}

/// A tool advertised by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}
