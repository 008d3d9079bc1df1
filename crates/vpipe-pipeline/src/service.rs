//! One pipeline request, end to end.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::Instrument;
use uuid::Uuid;

use vpipe_media::{FfmpegRunner, FfmpegStepExecutor, StepExecutor};
use vpipe_models::{ContainerFormat, ProcessingMode, ProcessingStep, StorageDestination};
use vpipe_storage::StorageCollaborator;

use crate::artifacts::ArtifactSet;
use crate::config::PipelineConfig;
use crate::delivery::{deliver, download_file_name, select_target, Delivery};
use crate::error::{PipelineError, PipelineResult};
use crate::logging::PipelineLogger;
use crate::metrics;
use crate::runner::PipelineRunner;

/// The unit submitted for processing.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub steps: Vec<ProcessingStep>,
    pub mode: ProcessingMode,
    pub destination: Option<StorageDestination>,
    /// Name of the uploaded file as the client sent it
    pub original_name: String,
}

/// Runs requests through persist → steps → delivery → cleanup.
#[derive(Clone)]
pub struct PipelineService {
    runner: PipelineRunner,
    storage: Arc<dyn StorageCollaborator>,
    config: PipelineConfig,
    permits: Arc<Semaphore>,
}

impl PipelineService {
    pub fn new(
        config: PipelineConfig,
        executor: Arc<dyn StepExecutor>,
        storage: Arc<dyn StorageCollaborator>,
    ) -> Self {
        Self {
            runner: PipelineRunner::new(executor),
            storage,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            config,
        }
    }

    /// Service backed by the FFmpeg executor.
    pub fn with_ffmpeg(config: PipelineConfig, storage: Arc<dyn StorageCollaborator>) -> Self {
        let mut ffmpeg = FfmpegRunner::new();
        if let Some(timeout) = config.step_timeout {
            ffmpeg = ffmpeg.with_timeout(timeout.as_secs());
        }
        Self::new(config, Arc::new(FfmpegStepExecutor::new(ffmpeg)), storage)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Pipelines currently allowed to start without waiting.
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Process one request. Every artifact it created is gone when this returns.
    pub async fn process(&self, request: PipelineRequest, upload: &[u8]) -> PipelineResult<Delivery> {
        if upload.is_empty() {
            return Err(PipelineError::invalid_request("Video file is empty"));
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| PipelineError::internal("pipeline service is shutting down"))?;

        let logger = PipelineLogger::new(Uuid::new_v4().to_string(), request.mode);
        let span = logger.create_span();

        async {
            let started = Instant::now();
            logger.log_start(request.steps.iter().filter(|s| s.applied).count(), upload.len());

            let mut artifacts = ArtifactSet::new(&self.config.work_dir);
            let outcome = self.execute(&request, upload, &mut artifacts, &logger).await;

            let report = artifacts.cleanup().await;
            metrics::record_cleanup_failures(report.failed.len());
            if !report.failed.is_empty() {
                logger.log_warning(&format!("{} artifacts could not be deleted", report.failed.len()));
            }

            let elapsed = started.elapsed().as_secs_f64();
            match &outcome {
                Ok(Delivery::Download(artifact)) => {
                    metrics::record_pipeline(request.mode.as_str(), "download", elapsed);
                    logger.log_completion(&format!("{} ({} bytes)", artifact.file_name, artifact.bytes.len()));
                }
                Ok(Delivery::Uploaded(confirmation)) => {
                    metrics::record_pipeline(request.mode.as_str(), "uploaded", elapsed);
                    logger.log_completion(&confirmation.message);
                }
                Err(e) => {
                    metrics::record_pipeline(request.mode.as_str(), e.kind(), elapsed);
                    logger.log_error(&e.to_string());
                }
            }

            outcome
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        request: &PipelineRequest,
        upload: &[u8],
        artifacts: &mut ArtifactSet,
        logger: &PipelineLogger,
    ) -> PipelineResult<Delivery> {
        let source_container = ContainerFormat::from_file_name(&request.original_name).unwrap_or_default();
        let source = artifacts
            .persist_upload(upload, source_container.extension())
            .await?;

        let output = self
            .runner
            .run(&request.steps, &source, source_container, request.mode, artifacts, logger)
            .await?;

        let file_name = download_file_name(
            request.mode,
            &request.original_name,
            output.container,
            output.converted,
            chrono::Utc::now().timestamp_millis(),
        );
        let target = select_target(request.mode, request.destination.as_ref());

        deliver(target, &output.path, file_name, output.container, self.storage.as_ref()).await
    }
}
