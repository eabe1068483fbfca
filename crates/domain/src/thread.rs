use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{Message, Role};

/// The accumulated state of one conversation thread.
///
/// Thread state is the single source of truth: every component reads the
/// latest checkpoint and writes a new one atomically per turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadState {
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Per-message metadata, keyed by message id.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Space threads only: participating agent id → sub-session id.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub sessions: HashMap<String, String>,
}

impl ThreadState {
    /// Apply a delta, producing the next state.
    pub fn apply(&mut self, delta: &ThreadDelta) {
        self.messages.extend(delta.messages.iter().cloned());
        self.metadata
            .extend(delta.metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        if let Some(title) = &delta.title {
            self.title = Some(title.clone());
        }
        self.sessions
            .extend(delta.sessions.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// The most recent `n` messages, in append order.
    pub fn recent_messages(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Check the tool-correlation invariant: every tool-role message must
    /// reference a ToolCall id emitted by an earlier assistant message.
    pub fn tool_correlation_holds(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        for msg in &self.messages {
            if msg.role == Role::Assistant {
                for call in &msg.tool_calls {
                    seen.insert(call.id.as_str());
                }
            }
            if msg.role == Role::Tool {
                match msg.tool_call_id.as_deref() {
                    Some(id) if seen.contains(id) => {}
                    _ => return false,
                }
            }
        }
        true
    }
}

/// The append unit: everything one completed turn adds to a thread.
/// One delta produces exactly one checkpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadDelta {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub sessions: HashMap<String, String>,
}

impl ThreadDelta {
    pub fn with_message(message: Message) -> Self {
        Self {
            messages: vec![message],
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
            && self.metadata.is_empty()
            && self.title.is_none()
            && self.sessions.is_empty()
    }
}

/// One atomically persisted snapshot of a thread's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub state: ThreadState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{ToolCall, ToolResult};

    #[test]
    fn apply_extends_messages_and_sets_title() {
        let mut state = ThreadState::default();
        let mut delta = ThreadDelta::with_message(Message::user("hi"));
        delta.title = Some("Greeting".into());
        delta.sessions.insert("agent-a".into(), "s1".into());

        state.apply(&delta);
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.title.as_deref(), Some("Greeting"));
        assert_eq!(state.sessions["agent-a"], "s1");

        // A later delta without a title leaves the existing one in place.
        state.apply(&ThreadDelta::with_message(Message::user("again")));
        assert_eq!(state.title.as_deref(), Some("Greeting"));
    }

    #[test]
    fn recent_messages_bounds() {
        let mut state = ThreadState::default();
        for i in 0..5 {
            state.messages.push(Message::user(format!("m{i}")));
        }
        assert_eq!(state.recent_messages(3).len(), 3);
        assert_eq!(state.recent_messages(20).len(), 5);
        assert_eq!(
            state.recent_messages(2)[0].content.text(),
            Some("m3")
        );
    }

    #[test]
    fn tool_correlation_invariant() {
        let mut state = ThreadState::default();
        state.messages.push(Message::assistant_with_tools(
            "",
            vec![ToolCall {
                id: "c1".into(),
                name: "echo".into(),
                arguments: serde_json::json!({}),
            }],
        ));
        state.messages.push(Message::tool_result(&ToolResult::ok(
            "c1",
            serde_json::json!(null),
        )));
        assert!(state.tool_correlation_holds());

        // A tool message answering an unknown call breaks the invariant.
        state.messages.push(Message::tool_result(&ToolResult::ok(
            "c99",
            serde_json::json!(null),
        )));
        assert!(!state.tool_correlation_holds());
    }
}
