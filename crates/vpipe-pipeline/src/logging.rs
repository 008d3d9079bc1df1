//! Structured pipeline logging.
//!
//! Every lifecycle event of one request carries the same `request_id` and
//! `mode` fields so a run can be followed in JSON logs.

use tracing::{error, info, warn, Span};
use vpipe_models::{ProcessingMode, StepType};

/// Request-scoped logger for pipeline lifecycle events.
#[derive(Debug, Clone)]
pub struct PipelineLogger {
    request_id: String,
    mode: ProcessingMode,
}

impl PipelineLogger {
    pub fn new(request_id: impl Into<String>, mode: ProcessingMode) -> Self {
        Self {
            request_id: request_id.into(),
            mode,
        }
    }

    pub fn log_start(&self, steps: usize, upload_bytes: usize) {
        info!(
            request_id = %self.request_id,
            mode = %self.mode,
            steps,
            upload_bytes,
            "Pipeline started"
        );
    }

    pub fn log_step_start(&self, index: usize, step_type: &StepType) {
        info!(
            request_id = %self.request_id,
            mode = %self.mode,
            index,
            step = %step_type,
            "Step started"
        );
    }

    pub fn log_step_complete(&self, index: usize, step_type: &StepType, elapsed_ms: u64) {
        info!(
            request_id = %self.request_id,
            mode = %self.mode,
            index,
            step = %step_type,
            elapsed_ms,
            "Step completed"
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            request_id = %self.request_id,
            mode = %self.mode,
            "Pipeline warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            request_id = %self.request_id,
            mode = %self.mode,
            "Pipeline error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            request_id = %self.request_id,
            mode = %self.mode,
            "Pipeline completed: {}", message
        );
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "pipeline",
            request_id = %self.request_id,
            mode = %self.mode
        )
    }
}
