//! Application state.

use std::sync::Arc;
use std::time::Duration;

use vpipe_pipeline::{PipelineConfig, PipelineService};
use vpipe_storage::StorageRouter;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: PipelineService,
}

impl AppState {
    pub fn new(config: ApiConfig, pipeline: PipelineService) -> Self {
        Self { config, pipeline }
    }

    /// Wire the FFmpeg pipeline and storage providers from the environment.
    pub fn from_env(config: ApiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let storage = StorageRouter::from_env(http);
        if !storage.has_s3() {
            tracing::warn!("S3 storage not configured; s3 deliveries will be rejected");
        }

        let pipeline = PipelineService::with_ffmpeg(PipelineConfig::from_env(), Arc::new(storage));
        Ok(Self::new(config, pipeline))
    }
}
