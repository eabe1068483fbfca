//! Append-only JSONL checkpoint files.
//!
//! Each thread gets a `<threadId>.jsonl` file under the base directory;
//! every completed turn appends one checkpoint line. An in-memory
//! write-through cache keeps the latest state so reads never hit disk
//! after the first load. Disk is written before the cache is updated, so
//! a failed write never leaves the cache ahead of the file.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;

use parley_domain::error::{Error, Result};
use parley_domain::thread::{Checkpoint, ThreadDelta, ThreadState};

use crate::store::ThreadStore;

/// File-backed thread store: one JSONL checkpoint log per thread.
pub struct JsonlThreadStore {
    base_dir: PathBuf,
    /// thread id → (last checkpoint seq, latest state).
    cache: RwLock<HashMap<String, (u64, ThreadState)>>,
}

impl JsonlThreadStore {
    /// Create the store, ensuring the base directory exists.
    pub fn new(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir).map_err(Error::Io)?;
        tracing::info!(path = %base_dir.display(), "thread store opened");
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn thread_path(&self, thread_id: &str) -> PathBuf {
        self.base_dir.join(format!("{thread_id}.jsonl"))
    }

    /// Read every checkpoint line from disk. Missing file → empty history.
    fn load_history(&self, thread_id: &str) -> Result<Vec<Checkpoint>> {
        let path = self.thread_path(thread_id);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };

        let mut history = Vec::new();
        for line in raw.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<Checkpoint>(line) {
                Ok(cp) => history.push(cp),
                Err(e) => {
                    // A torn trailing line is skipped rather than poisoning
                    // the whole thread.
                    tracing::warn!(thread_id, error = %e, "skipping unparseable checkpoint line");
                }
            }
        }
        Ok(history)
    }

    /// Latest (seq, state), from cache or disk.
    fn latest(&self, thread_id: &str) -> Result<(u64, ThreadState)> {
        if let Some(entry) = self.cache.read().get(thread_id) {
            return Ok(entry.clone());
        }

        let history = self.load_history(thread_id)?;
        let entry = history
            .last()
            .map(|cp| (cp.seq, cp.state.clone()))
            .unwrap_or((0, ThreadState::default()));

        self.cache
            .write()
            .insert(thread_id.to_owned(), entry.clone());
        Ok(entry)
    }
}

#[async_trait::async_trait]
impl ThreadStore for JsonlThreadStore {
    async fn get_latest(&self, thread_id: &str) -> Result<ThreadState> {
        Ok(self.latest(thread_id)?.1)
    }

    async fn append_and_checkpoint(
        &self,
        thread_id: &str,
        delta: ThreadDelta,
    ) -> Result<ThreadState> {
        let (seq, mut state) = self.latest(thread_id)?;
        state.apply(&delta);

        let checkpoint = Checkpoint {
            seq: seq + 1,
            created_at: Utc::now(),
            state: state.clone(),
        };

        let mut line = serde_json::to_string(&checkpoint).map_err(Error::Json)?;
        line.push('\n');
        let path = self.thread_path(thread_id);

        // Disk first; the cache is only updated once the line is durable.
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(Error::Io)?;
            file.write_all(line.as_bytes()).map_err(Error::Io)?;
            file.flush().map_err(Error::Io)
        })
        .await
        .map_err(|e| Error::ThreadStore(format!("checkpoint write task failed: {e}")))??;

        self.cache
            .write()
            .insert(thread_id.to_owned(), (checkpoint.seq, state.clone()));

        tracing::debug!(thread_id, seq = checkpoint.seq, "checkpoint written");
        Ok(state)
    }

    async fn list_checkpoints(&self, thread_id: &str, limit: usize) -> Result<Vec<Checkpoint>> {
        let history = self.load_history(thread_id)?;
        let start = history.len().saturating_sub(limit);
        Ok(history[start..].to_vec())
    }
}
