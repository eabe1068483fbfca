//! Thread persistence for the Parley orchestration core.
//!
//! A thread is an append-only, checkpointed conversation state. The
//! [`ThreadStore`] trait is the contract the engine and router consume;
//! [`MemoryThreadStore`] backs tests and embedders, [`JsonlThreadStore`]
//! persists one JSONL file of checkpoints per thread.

pub mod jsonl;
pub mod memory;
pub mod store;

pub use jsonl::JsonlThreadStore;
pub use memory::MemoryThreadStore;
pub use store::ThreadStore;
