//! Pipeline metrics.

use metrics::{counter, histogram};

use vpipe_models::StepType;

/// Metric names as constants for consistency.
pub mod names {
    pub const PIPELINE_RUNS_TOTAL: &str = "vpipe_pipeline_runs_total";
    pub const PIPELINE_DURATION_SECONDS: &str = "vpipe_pipeline_duration_seconds";
    pub const STEPS_TOTAL: &str = "vpipe_steps_total";
    pub const STEP_DURATION_SECONDS: &str = "vpipe_step_duration_seconds";
    pub const UPLOADS_TOTAL: &str = "vpipe_uploads_total";
    pub const CLEANUP_FAILURES_TOTAL: &str = "vpipe_cleanup_failures_total";
}

/// Record a finished pipeline run.
pub fn record_pipeline(mode: &str, outcome: &str, duration_secs: f64) {
    let labels = [("mode", mode.to_string()), ("outcome", outcome.to_string())];
    counter!(names::PIPELINE_RUNS_TOTAL, &labels).increment(1);
    histogram!(names::PIPELINE_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Label value for a step type. Client-invented names share one label so
/// they cannot grow the series set.
pub fn step_label(step_type: &StepType) -> &'static str {
    match step_type {
        StepType::Crop => "crop",
        StepType::Trim => "trim",
        StepType::Watermark => "watermark",
        StepType::Subtitle => "subtitle",
        StepType::Compress => "compress",
        StepType::Convert => "convert",
        StepType::Unknown(_) => "unknown",
    }
}

/// Record one step execution.
pub fn record_step(step_type: &StepType, status: &str, duration_secs: f64) {
    let labels = [
        ("step", step_label(step_type).to_string()),
        ("status", status.to_string()),
    ];
    counter!(names::STEPS_TOTAL, &labels).increment(1);
    histogram!(names::STEP_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a storage handoff.
pub fn record_upload(provider: &str, status: &str) {
    let labels = [("provider", provider.to_string()), ("status", status.to_string())];
    counter!(names::UPLOADS_TOTAL, &labels).increment(1);
}

/// Record artifacts that could not be deleted.
pub fn record_cleanup_failures(count: usize) {
    if count > 0 {
        counter!(names::CLEANUP_FAILURES_TOTAL).increment(count as u64);
    }
}
