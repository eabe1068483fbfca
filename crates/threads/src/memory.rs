//! In-memory thread store, used by tests and embedding callers.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;

use parley_domain::error::Result;
use parley_domain::thread::{Checkpoint, ThreadDelta, ThreadState};

use crate::store::ThreadStore;

/// Keeps the full checkpoint history of every thread in memory.
#[derive(Default)]
pub struct MemoryThreadStore {
    threads: RwLock<HashMap<String, Vec<Checkpoint>>>,
}

impl MemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of checkpoints written for a thread (for tests/monitoring).
    pub fn checkpoint_count(&self, thread_id: &str) -> usize {
        self.threads
            .read()
            .get(thread_id)
            .map_or(0, |history| history.len())
    }
}

#[async_trait::async_trait]
impl ThreadStore for MemoryThreadStore {
    async fn get_latest(&self, thread_id: &str) -> Result<ThreadState> {
        let threads = self.threads.read();
        Ok(threads
            .get(thread_id)
            .and_then(|history| history.last())
            .map(|cp| cp.state.clone())
            .unwrap_or_default())
    }

    async fn append_and_checkpoint(
        &self,
        thread_id: &str,
        delta: ThreadDelta,
    ) -> Result<ThreadState> {
        let mut threads = self.threads.write();
        let history = threads.entry(thread_id.to_owned()).or_default();

        let mut state = history.last().map(|cp| cp.state.clone()).unwrap_or_default();
        state.apply(&delta);

        history.push(Checkpoint {
            seq: history.len() as u64 + 1,
            created_at: Utc::now(),
            state: state.clone(),
        });
        Ok(state)
    }

    async fn list_checkpoints(&self, thread_id: &str, limit: usize) -> Result<Vec<Checkpoint>> {
        let threads = self.threads.read();
        let history = match threads.get(thread_id) {
            Some(h) => h,
            None => return Ok(Vec::new()),
        };
        let start = history.len().saturating_sub(limit);
        Ok(history[start..].to_vec())
    }
}
