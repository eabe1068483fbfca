//! Model invocation seam.

use parley_domain::error::Result;
use parley_domain::message::Message;
use parley_domain::tool::ToolDefinition;

/// Produces the next assistant message for a conversation.
///
/// Implementations wrap a concrete model API. The engine treats an
/// invocation as an opaque request/response: the returned message may
/// carry text, tool calls, or both. Invocation failures are fatal to the
/// turn (unlike tool failures, which are fed back to the model).
#[async_trait::async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<Message>;
}
