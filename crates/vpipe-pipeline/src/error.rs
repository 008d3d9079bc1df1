//! Pipeline error types.

use thiserror::Error;
use vpipe_models::StepType;
use vpipe_storage::StorageError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The request itself is unusable (e.g. empty upload).
    #[error("{0}")]
    InvalidRequest(String),

    /// A known step failed. Remaining steps did not run.
    #[error("Failed to process {step_type}: {reason}")]
    Step {
        /// Position among the applied steps (0-based)
        index: usize,
        step_type: StepType,
        reason: String,
    },

    /// A declared step type that has no executor.
    #[error("Step type '{step_type}' is not yet supported")]
    NotYetSupported { index: usize, step_type: StepType },

    /// The pipeline finished but the storage handoff failed.
    #[error("Upload failed: {}", storage_detail(.0))]
    Storage(#[from] StorageError),

    #[error("Artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn storage_detail(err: &StorageError) -> String {
    match err {
        StorageError::UploadFailed(msg) => msg.clone(),
        other => other.to_string(),
    }
}

impl PipelineError {
    pub fn step(index: usize, step_type: StepType, reason: impl Into<String>) -> Self {
        Self::Step {
            index,
            step_type,
            reason: reason.into(),
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Index of the failing step, for step-level failures.
    pub fn step_index(&self) -> Option<usize> {
        match self {
            Self::Step { index, .. } | Self::NotYetSupported { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::Step { .. } => "step",
            Self::NotYetSupported { .. } => "not_yet_supported",
            Self::Storage(_) => "storage",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }
}
