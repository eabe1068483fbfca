//! Cancellation tokens for in-flight turns.
//!
//! Each running turn gets a `CancelToken`. Calling `cancel()` signals the
//! turn loop to stop at the next check: before the next model invocation
//! and before the next tool dispatch. An interrupted turn writes no
//! checkpoint.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// A cancellation flag checked by the turn loop.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Active cancellation tokens keyed by session.
#[derive(Default)]
pub struct CancelMap {
    tokens: Mutex<HashMap<String, CancelToken>>,
}

impl CancelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a fresh token for a session. Replaces any
    /// token left behind by a previous turn.
    pub fn register(&self, session_key: &str) -> CancelToken {
        let token = CancelToken::new();
        self.tokens
            .lock()
            .insert(session_key.to_owned(), token.clone());
        token
    }

    /// Cancel the running turn for a session. Returns true if a token
    /// was registered.
    pub fn cancel(&self, session_key: &str) -> bool {
        match self.tokens.lock().get(session_key) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove the token for a session (called when its turn settles).
    pub fn remove(&self, session_key: &str) {
        self.tokens.lock().remove(session_key);
    }

    pub fn is_running(&self, session_key: &str) -> bool {
        self.tokens.lock().contains_key(session_key)
    }
}
