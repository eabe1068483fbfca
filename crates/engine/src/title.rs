//! Thread title generation.
//!
//! Runs once per thread, on the first completed turn of an untitled
//! thread, concurrently with tool dispatch. Failure is non-fatal: the
//! turn completes and the thread stays untitled.

use parley_domain::message::{Message, Role};

use crate::invoker::ModelInvoker;

/// Characters of the source message fed to the title prompt.
pub const TITLE_SOURCE_MAX_CHARS: usize = 200;

/// Hard cap on title length, in words.
pub const TITLE_MAX_WORDS: usize = 6;

pub const TITLE_INSTRUCTION: &str = "Summarize the user's message as a short \
conversation title of at most 6 words. Reply with the title only, no quotes \
and no punctuation around it.";

/// The most recent user message, truncated for the title prompt.
pub fn last_user_excerpt(messages: &[Message]) -> Option<String> {
    let text = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .and_then(|m| m.content.text())?;
    Some(text.chars().take(TITLE_SOURCE_MAX_CHARS).collect())
}

/// Normalize a raw model reply into a title: trim, strip surrounding
/// quotes, clamp to the word cap.
pub fn clamp_title(raw: &str) -> String {
    raw.trim()
        .trim_matches('"')
        .split_whitespace()
        .take(TITLE_MAX_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Generate a title from the thread's latest user message. Returns `None`
/// when there is nothing to summarize or the invocation fails.
pub async fn generate_title(invoker: &dyn ModelInvoker, messages: &[Message]) -> Option<String> {
    let excerpt = last_user_excerpt(messages)?;
    let prompt = vec![Message::system(TITLE_INSTRUCTION), Message::user(excerpt)];

    match invoker.invoke(&prompt, &[]).await {
        Ok(reply) => {
            let title = clamp_title(reply.content.text().unwrap_or_default());
            if title.is_empty() {
                None
            } else {
                Some(title)
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "title generation failed, leaving thread untitled");
            None
        }
    }
}
