use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A model-issued request to execute a named tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The correlated outcome of a tool call. Results are matched back to
/// their call by id, never by position: concurrent dispatch completes
/// out of order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: serde_json::Value,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(tool_call_id: impl Into<String>, content: serde_json::Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content,
            is_error: false,
        }
    }

    /// A structured error result the model can read and react to.
    pub fn error(tool_call_id: impl Into<String>, err: &Error) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: serde_json::json!({
                "error": { "type": err.kind(), "message": err.to_string() }
            }),
            is_error: true,
        }
    }
}

/// A tool the model may invoke, tagged by resolution strategy.
///
/// Definitions are created and edited by the registry/CRUD layer; the
/// core only reads them at dispatch time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolDefinition {
    /// Resolved against an injected registry of callable handlers.
    Static { name: String },
    /// Resolved declaratively: an HTTP request built from the spec.
    Spec { name: String, api_spec: ApiSpec },
}

impl ToolDefinition {
    pub fn name(&self) -> &str {
        match self {
            ToolDefinition::Static { name } => name,
            ToolDefinition::Spec { name, .. } => name,
        }
    }

    pub fn api_spec(&self) -> Option<&ApiSpec> {
        match self {
            ToolDefinition::Static { .. } => None,
            ToolDefinition::Spec { api_spec, .. } => Some(api_spec),
        }
    }
}

/// Declarative HTTP invocation: method, URL parts, and templates.
///
/// Query-parameter values and body-template string leaves of the form
/// `{key}` are substituted from the call arguments at dispatch time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSpec {
    pub method: String,
    pub base_url: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query_params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_template: Option<serde_json::Value>,
}
