use serde::Serialize;
use serde_json::Value;

/// Events emitted while a turn runs, for streaming callers.
///
/// The blocking and streaming call modes share one stepper; streaming
/// callers read these off an mpsc channel, blocking callers drain them.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StepEvent {
    /// Assistant text produced by a model invocation.
    #[serde(rename = "model_chunk")]
    ModelChunk { text: String },

    /// A tool call is being dispatched.
    #[serde(rename = "tool_dispatched")]
    ToolDispatched {
        call_id: String,
        tool_name: String,
        arguments: Value,
    },

    /// A tool call settled (success or structured error).
    #[serde(rename = "tool_completed")]
    ToolCompleted {
        call_id: String,
        tool_name: String,
        content: Value,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },

    /// The thread title was generated and set.
    #[serde(rename = "title_set")]
    TitleSet { title: String },

    /// The turn finished and its checkpoint was written.
    #[serde(rename = "turn_completed")]
    TurnCompleted {
        message_id: String,
        session_id: String,
    },

    /// The turn was stopped by a cancellation request. No checkpoint is
    /// written for the interrupted turn.
    #[serde(rename = "stopped")]
    Stopped,

    /// The turn aborted with an error.
    #[serde(rename = "error")]
    Error { message: String },
}
