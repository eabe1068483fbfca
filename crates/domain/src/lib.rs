//! Shared domain types for the Parley orchestration core.
//!
//! Everything that crosses a crate boundary lives here: conversation
//! messages, tool calls and definitions, thread state and checkpoints,
//! space membership, step events, and the error taxonomy.

pub mod error;
pub mod message;
pub mod space;
pub mod stream;
pub mod thread;
pub mod tool;

pub use error::{Error, Result};
pub use message::{Message, MessageContent, Role};
pub use stream::StepEvent;
pub use thread::{Checkpoint, ThreadDelta, ThreadState};
pub use tool::{ApiSpec, ToolCall, ToolDefinition, ToolResult};
