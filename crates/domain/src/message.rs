use serde::{Deserialize, Serialize};

use crate::tool::{ToolCall, ToolResult};

/// A message in a conversation thread.
///
/// Messages are immutable once appended; append order within a thread is
/// the sole basis for conversation context. `id` is generated at creation
/// when the caller does not supply one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: MessageContent,
    /// Author tag (e.g. `"agent:researcher"` in a space thread).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls carried by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For tool-role messages: the id of the ToolCall this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Message content: plain text for model-facing roles, arbitrary JSON for
/// tool results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Json(serde_json::Value),
}

impl MessageContent {
    /// The primary text content, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(t) => Some(t.as_str()),
            MessageContent::Json(v) => v.as_str(),
        }
    }
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    fn new(role: Role, content: MessageContent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, MessageContent::Text(text.into()))
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, MessageContent::Text(text.into()))
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, MessageContent::Text(text.into()))
    }

    pub fn assistant_with_tools(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::assistant(text);
        msg.tool_calls = tool_calls;
        msg
    }

    /// Build a tool-role message from a correlated tool result.
    pub fn tool_result(result: &ToolResult) -> Self {
        let mut msg = Self::new(Role::Tool, MessageContent::Json(result.content.clone()));
        msg.tool_call_id = Some(result.tool_call_id.clone());
        msg
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_generate_ids() {
        let a = Message::user("hi");
        let b = Message::user("hi");
        assert_ne!(a.id, b.id);
        assert_eq!(a.role, Role::User);
        assert_eq!(a.content.text(), Some("hi"));
    }

    #[test]
    fn tool_result_message_carries_correlation_id() {
        let result = ToolResult::ok("call_1", serde_json::json!({"x": 1}));
        let msg = Message::tool_result(&result);
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn serde_skips_empty_optionals() {
        let msg = Message::assistant("done");
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("tool_calls").is_none());
        assert!(json.get("name").is_none());
        assert!(json.get("tool_call_id").is_none());
    }

    #[test]
    fn content_roundtrips_untagged() {
        let text: MessageContent = serde_json::from_value(serde_json::json!("hello")).unwrap();
        assert_eq!(text.text(), Some("hello"));
        let json: MessageContent =
            serde_json::from_value(serde_json::json!({"a": [1, 2]})).unwrap();
        assert!(json.text().is_none());
    }
}
