//! Core types for the tool catalog and invoker.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

// =============================================================================
// Parameter schema
// =============================================================================

/// Type and constraints of one operation parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    /// Calendar date in `YYYY-MM-DD` format.
    Date,
    /// Integer within an inclusive range.
    Integer { min: i64, max: i64 },
    /// Boolean flag.
    Boolean,
    /// Free-form non-empty text.
    Text,
    /// One of a fixed set of literal values.
    Enum(&'static [&'static str]),
}

/// Schema for one parameter of an operation.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub required: bool,
    pub ty: ParamType,
    pub description: &'static str,
}

/// One analytics operation: a name plus an ordered parameter schema.
///
/// Operations are immutable after catalog construction.
#[derive(Debug, Clone)]
pub struct Operation {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
    /// Parameter pairs that must not be supplied together.
    pub exclusive: &'static [[&'static str; 2]],
}

impl Operation {
    /// Look up a parameter spec by name.
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// JSON Schema for this operation's parameters, in the shape expected
    /// by OpenAI-compatible function declarations.
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.params {
            let schema = match &param.ty {
                ParamType::Date => json!({
                    "type": "string",
                    "format": "date",
                    "description": param.description,
                }),
                ParamType::Integer { min, max } => json!({
                    "type": "integer",
                    "minimum": min,
                    "maximum": max,
                    "description": param.description,
                }),
                ParamType::Boolean => json!({
                    "type": "boolean",
                    "description": param.description,
                }),
                ParamType::Text => json!({
                    "type": "string",
                    "description": param.description,
                }),
                ParamType::Enum(values) => json!({
                    "type": "string",
                    "enum": values,
                    "description": param.description,
                }),
            };
            properties.insert(param.name.to_string(), schema);
            if param.required {
                required.push(Value::String(param.name.to_string()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

// =============================================================================
// Tool call and result
// =============================================================================

/// One validated invocation of an operation.
///
/// Created by the orchestrator, consumed once by the invoker, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Monotonically increasing sequence number within a turn.
    pub seq: u32,
    /// Catalog operation name.
    pub operation: String,
    /// Validated argument set, tenant id included.
    pub arguments: Map<String, Value>,
}

/// Machine-readable failure classification for a tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    Unreachable,
    BadRequest,
    Unauthorized,
    ServerError,
    Timeout,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Unreachable => "unreachable",
            FailureKind::BadRequest => "bad request",
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::ServerError => "server error",
            FailureKind::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Outcome of one tool invocation: a structured payload or a typed failure.
///
/// The invoker never lets a fault escape past this type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ToolResult {
    Success {
        /// Payload passed through from the tool server, unreshaped.
        data: Value,
        /// Chart reference URL, surfaced verbatim when present.
        chart_url: Option<String>,
    },
    Failure {
        kind: FailureKind,
        detail: String,
    },
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success { .. })
    }

    pub fn chart_url(&self) -> Option<&str> {
        match self {
            ToolResult::Success { chart_url, .. } => chart_url.as_deref(),
            ToolResult::Failure { .. } => None,
        }
    }
}
