use thiserror::Error;

/// Errors surfaced by the counselling core.
#[derive(Error, Debug)]
pub enum CounselError {
    /// A completion endpoint failed or returned malformed output.
    #[error("completion request failed: {0}")]
    CompletionFailed(String),

    /// The knowledge base retrieval call failed.
    #[error("retrieval request failed: {0}")]
    RetrievalFailed(String),

    /// The history summarization call failed during compaction.
    #[error("history summarization failed: {0}")]
    SummarizationFailed(String),

    /// The audit log could not be set up (directory creation, file naming).
    /// Per-turn persistence failures are traced, never raised.
    #[error("audit log setup failed: {0}")]
    AuditSetup(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CounselError>;
