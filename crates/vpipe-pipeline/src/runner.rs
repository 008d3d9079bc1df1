//! Sequential step runner.
//!
//! Applied steps run strictly in list order. Each step reads the previous
//! step's output and writes a fresh tracked artifact; the first fatal error
//! stops the chain.
//!
//! Watermark regions are drawn on the source frame. Each crop reported by the
//! executor is folded into a [`FrameMapping`] that moves later regions into
//! the cropped and rescaled frame.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use vpipe_media::StepExecutor;
use vpipe_models::{
    ContainerFormat, FrameMapping, ProcessingMode, ProcessingStep, StepOperation, StepResolveError,
};

use crate::artifacts::ArtifactSet;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::PipelineLogger;
use crate::metrics;

/// Final artifact of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    /// Last step's output, or the source itself when nothing ran
    pub path: PathBuf,
    pub container: ContainerFormat,
    /// Whether any convert step executed
    pub converted: bool,
    /// Number of applied steps that ran
    pub steps_run: usize,
}

/// Threads artifacts through a [`StepExecutor`].
#[derive(Clone)]
pub struct PipelineRunner {
    executor: Arc<dyn StepExecutor>,
}

impl PipelineRunner {
    pub fn new(executor: Arc<dyn StepExecutor>) -> Self {
        Self { executor }
    }

    /// Run the applied steps of `steps` against `source`.
    ///
    /// Every output path is registered in `artifacts` before the executor
    /// touches it.
    pub async fn run(
        &self,
        steps: &[ProcessingStep],
        source: &Path,
        source_container: ContainerFormat,
        mode: ProcessingMode,
        artifacts: &mut ArtifactSet,
        logger: &PipelineLogger,
    ) -> PipelineResult<PipelineOutput> {
        let mut current = source.to_path_buf();
        let mut container = source_container;
        let mut converted = false;
        let mut steps_run = 0;
        let mut mapping = FrameMapping::identity();

        for (index, step) in steps.iter().filter(|s| s.applied).enumerate() {
            let step_type = step.step_type.clone();
            logger.log_step_start(index, &step_type);
            let started = Instant::now();

            let result = match step.resolve() {
                Ok(operation) => {
                    let operation = match operation {
                        StepOperation::Watermark(params) if !mapping.is_identity() => {
                            StepOperation::Watermark(params.mapped(&mapping))
                        }
                        other => other,
                    };
                    let next_container = operation.output_container().unwrap_or(container);
                    let output = artifacts.allocate(&format!("step{}", index), next_container.extension());

                    self.executor
                        .execute(&operation, &current, &output, mode)
                        .await
                        .map(|reframe| {
                            if let Some(r) = reframe {
                                mapping = mapping.then_crop(&r.window, r.output.width, r.output.height);
                            }
                            converted |= operation.output_container().is_some();
                            container = next_container;
                            output
                        })
                        .map_err(|e| PipelineError::step(index, step_type.clone(), e.detail()))
                }
                Err(StepResolveError::Unsupported(name)) => {
                    logger.log_warning(&format!("Unsupported step type '{}', passing input through", name));
                    let output = artifacts.allocate(&format!("step{}", index), container.extension());

                    self.executor
                        .pass_through(&current, &output)
                        .await
                        .map(|()| output)
                        .map_err(|e| PipelineError::step(index, step_type.clone(), e.detail()))
                }
                Err(StepResolveError::NotYetSupported(step_type)) => {
                    Err(PipelineError::NotYetSupported { index, step_type })
                }
                Err(StepResolveError::Malformed { reason, .. }) => {
                    Err(PipelineError::step(index, step_type.clone(), reason))
                }
            };

            let elapsed = started.elapsed();
            match result {
                Ok(output) => {
                    metrics::record_step(&step_type, "success", elapsed.as_secs_f64());
                    logger.log_step_complete(index, &step_type, elapsed.as_millis() as u64);
                    current = output;
                    steps_run += 1;
                }
                Err(e) => {
                    metrics::record_step(&step_type, "error", elapsed.as_secs_f64());
                    logger.log_error(&format!("step {} failed: {}", index, e));
                    return Err(e);
                }
            }
        }

        Ok(PipelineOutput {
            path: current,
            container,
            converted,
            steps_run,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use vpipe_media::{FrameSize, MediaError, MediaResult, Reframe};
    use vpipe_models::{CropRect, PixelRect, StepType};

    /// Appends the step type to the input bytes so chaining is visible in the output.
    #[derive(Default)]
    struct TaggingExecutor {
        calls: Mutex<Vec<(StepType, PathBuf, PathBuf)>>,
        operations: Mutex<Vec<StepOperation>>,
        fail_on: Option<StepType>,
        crop_reframe: Option<Reframe>,
    }

    #[async_trait]
    impl StepExecutor for TaggingExecutor {
        async fn execute(
            &self,
            operation: &StepOperation,
            input: &Path,
            output: &Path,
            _mode: ProcessingMode,
        ) -> MediaResult<Option<Reframe>> {
            let step_type = operation.step_type();
            self.operations.lock().unwrap().push(operation.clone());
            self.calls
                .lock()
                .unwrap()
                .push((step_type.clone(), input.to_path_buf(), output.to_path_buf()));

            if self.fail_on.as_ref() == Some(&step_type) {
                tokio::fs::write(output, b"partial").await?;
                return Err(MediaError::ffmpeg_failed("FFmpeg exited with non-zero status", None, Some(1)));
            }

            let mut bytes = tokio::fs::read(input).await?;
            bytes.extend_from_slice(format!("|{}", step_type).as_bytes());
            tokio::fs::write(output, bytes).await?;
            Ok(matches!(operation, StepOperation::Crop(_)).then_some(self.crop_reframe).flatten())
        }
    }

    fn step(value: serde_json::Value) -> ProcessingStep {
        serde_json::from_value(value).unwrap()
    }

    async fn setup(dir: &TempDir) -> (ArtifactSet, PathBuf) {
        let mut artifacts = ArtifactSet::new(dir.path());
        let source = artifacts.persist_upload(b"source", "mp4").await.unwrap();
        (artifacts, source)
    }

    fn logger() -> PipelineLogger {
        PipelineLogger::new("test", ProcessingMode::Final)
    }

    #[tokio::test]
    async fn test_no_applied_steps_returns_source() {
        let dir = TempDir::new().unwrap();
        let (mut artifacts, source) = setup(&dir).await;
        let executor = Arc::new(TaggingExecutor::default());
        let runner = PipelineRunner::new(executor.clone());

        let steps = vec![step(json!({"type": "crop", "parameters": {"width": 10, "height": 10}, "applied": false}))];
        let output = runner
            .run(&steps, &source, ContainerFormat::Mp4, ProcessingMode::Final, &mut artifacts, &logger())
            .await
            .unwrap();

        assert_eq!(output.path, source);
        assert_eq!(output.steps_run, 0);
        assert!(executor.calls.lock().unwrap().is_empty());
        assert_eq!(tokio::fs::read(&output.path).await.unwrap(), b"source");
    }

    #[tokio::test]
    async fn test_steps_chain_in_order() {
        let dir = TempDir::new().unwrap();
        let (mut artifacts, source) = setup(&dir).await;
        let executor = Arc::new(TaggingExecutor::default());
        let runner = PipelineRunner::new(executor.clone());

        let steps = vec![
            step(json!({"type": "crop", "parameters": {"width": 1080, "height": 1920}})),
            step(json!({"type": "trim", "parameters": {"startTime": 1}, "applied": false})),
            step(json!({"type": "compress", "parameters": {"quality": "low"}})),
        ];
        let output = runner
            .run(&steps, &source, ContainerFormat::Mp4, ProcessingMode::Final, &mut artifacts, &logger())
            .await
            .unwrap();

        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, source);
        assert_eq!(calls[1].1, calls[0].2, "compress must read crop's output");
        assert_eq!(output.path, calls[1].2);
        assert_eq!(tokio::fs::read(&output.path).await.unwrap(), b"source|crop|compress");
        assert_eq!(artifacts.tracked().len(), 3);
    }

    #[tokio::test]
    async fn test_convert_changes_container() {
        let dir = TempDir::new().unwrap();
        let (mut artifacts, source) = setup(&dir).await;
        let runner = PipelineRunner::new(Arc::new(TaggingExecutor::default()));

        let steps = vec![step(json!({"type": "convert", "parameters": {"outputFormat": "webm", "codec": "vp9"}}))];
        let output = runner
            .run(&steps, &source, ContainerFormat::Mp4, ProcessingMode::Final, &mut artifacts, &logger())
            .await
            .unwrap();

        assert_eq!(output.container, ContainerFormat::Webm);
        assert!(output.converted);
        assert_eq!(output.path.extension().unwrap(), "webm");
    }

    #[tokio::test]
    async fn test_failure_stops_chain_and_reports_index() {
        let dir = TempDir::new().unwrap();
        let (mut artifacts, source) = setup(&dir).await;
        let executor = Arc::new(TaggingExecutor {
            fail_on: Some(StepType::Compress),
            ..Default::default()
        });
        let runner = PipelineRunner::new(executor.clone());

        let steps = vec![
            step(json!({"type": "crop", "parameters": {"width": 100, "height": 100}})),
            step(json!({"type": "compress"})),
            step(json!({"type": "convert"})),
        ];
        let err = runner
            .run(&steps, &source, ContainerFormat::Mp4, ProcessingMode::Final, &mut artifacts, &logger())
            .await
            .unwrap_err();

        assert_eq!(err.step_index(), Some(1));
        assert!(err.to_string().starts_with("Failed to process compress:"));
        assert_eq!(executor.calls.lock().unwrap().len(), 2, "convert must not run");
        // The partial output of the failed step is still tracked.
        assert_eq!(artifacts.tracked().len(), 3);
        assert!(artifacts.tracked()[2].exists());
    }

    #[tokio::test]
    async fn test_unknown_step_passes_through() {
        let dir = TempDir::new().unwrap();
        let (mut artifacts, source) = setup(&dir).await;
        let runner = PipelineRunner::new(Arc::new(TaggingExecutor::default()));

        let steps = vec![
            step(json!({"type": "stabilize"})),
            step(json!({"type": "compress"})),
        ];
        let output = runner
            .run(&steps, &source, ContainerFormat::Mp4, ProcessingMode::Final, &mut artifacts, &logger())
            .await
            .unwrap();

        assert_eq!(output.steps_run, 2);
        assert_eq!(tokio::fs::read(&output.path).await.unwrap(), b"source|compress");
    }

    #[tokio::test]
    async fn test_subtitle_is_reported() {
        let dir = TempDir::new().unwrap();
        let (mut artifacts, source) = setup(&dir).await;
        let executor = Arc::new(TaggingExecutor::default());
        let runner = PipelineRunner::new(executor.clone());

        let steps = vec![
            step(json!({"type": "subtitle", "parameters": {"text": "hello"}})),
            step(json!({"type": "compress"})),
        ];
        let err = runner
            .run(&steps, &source, ContainerFormat::Mp4, ProcessingMode::Final, &mut artifacts, &logger())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::NotYetSupported { index: 0, step_type: StepType::Subtitle }
        ));
        assert!(executor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_parameters_fail_the_step() {
        let dir = TempDir::new().unwrap();
        let (mut artifacts, source) = setup(&dir).await;
        let runner = PipelineRunner::new(Arc::new(TaggingExecutor::default()));

        let steps = vec![step(json!({"type": "trim", "parameters": {"startTime": 10, "endTime": 2}}))];
        let err = runner
            .run(&steps, &source, ContainerFormat::Mp4, ProcessingMode::Final, &mut artifacts, &logger())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Step { index: 0, step_type: StepType::Trim, .. }));
    }

    fn watermark_regions(op: &StepOperation) -> Vec<PixelRect> {
        match op {
            StepOperation::Watermark(params) => params.regions.clone(),
            other => panic!("expected a watermark, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_watermark_after_crop_is_mapped_into_cropped_frame() {
        let dir = TempDir::new().unwrap();
        let (mut artifacts, source) = setup(&dir).await;
        // 1920x1080 source, 9:16 crop previewed at 404x720
        let executor = Arc::new(TaggingExecutor {
            crop_reframe: Some(Reframe {
                window: CropRect { crop_width: 608, crop_height: 1080, crop_x: 656, crop_y: 0 },
                output: FrameSize::new(404, 720),
            }),
            ..Default::default()
        });
        let runner = PipelineRunner::new(executor.clone());

        let steps = vec![
            step(json!({"type": "watermark", "parameters": {"regions": [{"x": 960, "y": 540, "width": 152, "height": 108}]}})),
            step(json!({"type": "crop", "parameters": {"width": 1080, "height": 1920}})),
            step(json!({"type": "watermark", "parameters": {"regions": [{"x": 960, "y": 540, "width": 152, "height": 108}]}})),
        ];
        runner
            .run(&steps, &source, ContainerFormat::Mp4, ProcessingMode::Preview, &mut artifacts, &logger())
            .await
            .unwrap();

        let operations = executor.operations.lock().unwrap();
        assert_eq!(operations.len(), 3);

        // before the crop, regions stay in source coordinates
        assert_eq!(watermark_regions(&operations[0]), vec![PixelRect::new(960.0, 540.0, 152.0, 108.0)]);

        let mapped = watermark_regions(&operations[2]);
        assert_eq!(mapped.len(), 1);
        assert!((mapped[0].x - 202.0).abs() < 1e-6);
        assert!((mapped[0].y - 360.0).abs() < 1e-6);
        assert!((mapped[0].width - 101.0).abs() < 1e-6);
        assert!((mapped[0].height - 72.0).abs() < 1e-6);
    }
}
