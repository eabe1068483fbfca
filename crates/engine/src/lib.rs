//! Conversation engine: the turn loop and the space router.
//!
//! [`ConversationEngine`] runs one agent turn against a thread: load the
//! latest checkpoint, invoke the model, dispatch any tool calls it
//! issues, feed results back, and persist exactly one checkpoint for the
//! completed turn. [`SpaceRouter`] sits above it for shared threads,
//! nominating which agent member (if any) responds next.

pub mod cancel;
pub mod invoker;
pub mod session_lock;
pub mod space;
pub mod title;
pub mod turn;

pub use cancel::{CancelMap, CancelToken};
pub use invoker::ModelInvoker;
pub use session_lock::{SessionBusy, SessionLockMap};
pub use space::{
    AgentProfile, Membership, RouteClassifier, RouteSummary, SpaceRouter, SpaceRouterBuilder,
    DEFAULT_MAX_AGENT_TURNS, ROUTER_CONTEXT_MESSAGES,
};
pub use turn::{ConversationEngine, EngineConfig, TurnInput, TurnOutcome, MAX_TOOL_LOOPS};
