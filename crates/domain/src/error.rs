/// Shared error type used across all Parley crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("model invocation: {0}")]
    ModelInvocation(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool misconfigured: {name}: {reason}")]
    ToolMisconfigured { name: String, reason: String },

    #[error("upstream HTTP {status}: {status_text}")]
    Upstream { status: u16, status_text: String },

    #[error("membership denied: {0}")]
    MembershipDenied(String),

    #[error("thread store: {0}")]
    ThreadStore(String),

    #[error("turn cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Tool-level errors are recovered locally: they become a tool-result
    /// message the model can see on the next invoke. Everything else
    /// aborts the turn.
    pub fn is_tool_error(&self) -> bool {
        matches!(
            self,
            Error::ToolNotFound(_) | Error::ToolMisconfigured { .. } | Error::Upstream { .. }
        )
    }

    /// A short machine-readable tag for structured error tool results.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::ModelInvocation(_) => "model_invocation",
            Error::ToolNotFound(_) => "tool_not_found",
            Error::ToolMisconfigured { .. } => "tool_misconfigured",
            Error::Upstream { .. } => "upstream_error",
            Error::MembershipDenied(_) => "membership_denied",
            Error::ThreadStore(_) => "thread_store",
            Error::Cancelled => "cancelled",
            Error::Other(_) => "other",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
