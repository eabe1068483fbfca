//! Per-session concurrency control.
//!
//! A session serializes its turns: the turn loop holds the session lock
//! from load to checkpoint, so two messages arriving back to back run as
//! two complete turns, never interleaved.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Per-session run locks. Each session key maps to a `Semaphore(1)`;
/// holding the permit grants exclusive access for one turn.
#[derive(Default)]
pub struct SessionLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the run lock for a session, waiting behind any turn that
    /// is already in flight. The permit auto-releases on drop.
    pub async fn acquire(&self, session_key: &str) -> Result<OwnedSemaphorePermit, SessionBusy> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(session_key.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.acquire_owned().await.map_err(|_| SessionBusy)
    }

    /// Number of tracked sessions (for monitoring).
    pub fn session_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop semaphores for sessions with no turn in flight.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}

/// The session's lock is no longer usable (its semaphore was closed).
#[derive(Debug)]
pub struct SessionBusy;

impl std::fmt::Display for SessionBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session is busy: a turn is already in progress")
    }
}

impl std::error::Error for SessionBusy {}
