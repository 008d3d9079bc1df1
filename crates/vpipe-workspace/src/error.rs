//! Workspace error types.

use thiserror::Error;

pub type WorkspaceResult<T> = Result<T, WorkspaceError>;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("No video loaded")]
    NoVideo,

    /// A preview or export is already running
    #[error("Workspace is busy processing")]
    Busy,

    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("Invalid step parameters: {0}")]
    InvalidParameters(String),

    /// The pipeline API answered with a non-success status
    #[error("Pipeline request failed ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkspaceError {
    /// Whether the same call may succeed if simply tried again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkspaceError::Busy | WorkspaceError::Network(_) => true,
            WorkspaceError::Server { status, .. } => *status == 429 || *status >= 502,
            _ => false,
        }
    }
}
