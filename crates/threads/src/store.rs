use parley_domain::error::Result;
use parley_domain::thread::{Checkpoint, ThreadDelta, ThreadState};

/// The persisted-thread contract the engine and router consume.
///
/// Checkpoints are whole-state snapshots written atomically per completed
/// turn; partial-turn state is never visible to other readers. The engine
/// assumes a single active writer per session (callers serialize).
#[async_trait::async_trait]
pub trait ThreadStore: Send + Sync {
    /// The latest accumulated state. Unknown threads yield the empty state.
    async fn get_latest(&self, thread_id: &str) -> Result<ThreadState>;

    /// Apply a delta and persist the resulting state as a new checkpoint.
    /// Returns the updated state.
    async fn append_and_checkpoint(
        &self,
        thread_id: &str,
        delta: ThreadDelta,
    ) -> Result<ThreadState>;

    /// The most recent checkpoints, oldest first, at most `limit`.
    async fn list_checkpoints(&self, thread_id: &str, limit: usize) -> Result<Vec<Checkpoint>>;
}
