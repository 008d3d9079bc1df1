//! End-to-end pipeline flows against a scripted executor and storage.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use vpipe_media::{MediaError, MediaResult, Reframe, StepExecutor};
use vpipe_models::{
    ProcessingMode, ProcessingStep, StepOperation, StorageDestination, StorageProvider,
};
use vpipe_pipeline::{Delivery, PipelineConfig, PipelineError, PipelineRequest, PipelineService};
use vpipe_storage::{StorageCollaborator, StorageResult, StoredObject};

/// Appends `|<step>` to whatever it reads, and records every input it saw.
#[derive(Default)]
struct ScriptedExecutor {
    inputs: Mutex<Vec<(String, Vec<u8>)>>,
    fail_on: Option<&'static str>,
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        op: &StepOperation,
        input: &Path,
        output: &Path,
        _mode: ProcessingMode,
    ) -> MediaResult<Option<Reframe>> {
        let name = op.step_type().to_string();
        let mut bytes = tokio::fs::read(input).await?;
        self.inputs.lock().unwrap().push((name.clone(), bytes.clone()));

        if self.fail_on == Some(name.as_str()) {
            tokio::fs::write(output, b"partial").await?;
            return Err(MediaError::ffmpeg_failed("FFmpeg exited with status 1", None, Some(1)));
        }

        bytes.extend_from_slice(format!("|{}", name).as_bytes());
        tokio::fs::write(output, bytes).await?;
        Ok(None)
    }
}

/// Accepts every upload and remembers what the file held at handoff time.
#[derive(Default)]
struct RecordingStorage {
    received: Mutex<Vec<(PathBuf, Vec<u8>, String)>>,
}

#[async_trait]
impl StorageCollaborator for RecordingStorage {
    async fn store(
        &self,
        local_path: &Path,
        destination: &StorageDestination,
        original_name: &str,
    ) -> StorageResult<StoredObject> {
        let bytes = tokio::fs::read(local_path).await?;
        self.received
            .lock()
            .unwrap()
            .push((local_path.to_path_buf(), bytes, original_name.to_string()));
        Ok(StoredObject {
            provider: destination.provider,
            url: format!("s3://exports/{}", original_name),
        })
    }
}

struct Harness {
    dir: TempDir,
    executor: Arc<ScriptedExecutor>,
    storage: Arc<RecordingStorage>,
    service: PipelineService,
}

impl Harness {
    fn new(executor: ScriptedExecutor) -> Self {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(executor);
        let storage = Arc::new(RecordingStorage::default());
        let service = PipelineService::new(
            PipelineConfig::default().with_work_dir(dir.path()),
            executor.clone(),
            storage.clone(),
        );
        Self { dir, executor, storage, service }
    }

    fn leftover_files(&self) -> usize {
        match std::fs::read_dir(self.dir.path()) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}

fn step(value: serde_json::Value) -> ProcessingStep {
    serde_json::from_value(value).unwrap()
}

fn request(steps: Vec<ProcessingStep>, mode: ProcessingMode) -> PipelineRequest {
    PipelineRequest {
        steps,
        mode,
        destination: None,
        original_name: "holiday.mp4".to_string(),
    }
}

fn s3_destination() -> StorageDestination {
    serde_json::from_value(json!({"provider": "s3", "s3": {"prefix": "exports/"}})).unwrap()
}

#[tokio::test]
async fn test_no_applied_steps_returns_original_bytes() {
    let harness = Harness::new(ScriptedExecutor::default());
    let steps = vec![step(json!({"type": "compress", "applied": false}))];

    let delivery = harness
        .service
        .process(request(steps, ProcessingMode::Final), b"original-bytes")
        .await
        .unwrap();

    let Delivery::Download(artifact) = delivery else {
        panic!("expected a download");
    };
    assert_eq!(artifact.bytes, b"original-bytes");
    assert_eq!(artifact.file_name, "processed_holiday.mp4");
    assert_eq!(artifact.content_type, "video/mp4");
    assert!(harness.executor.inputs.lock().unwrap().is_empty());
    assert_eq!(harness.leftover_files(), 0);
}

#[tokio::test]
async fn test_steps_chain_in_order() {
    let harness = Harness::new(ScriptedExecutor::default());
    let steps = vec![
        step(json!({"type": "crop", "parameters": {"width": 1080, "height": 1920}})),
        step(json!({"type": "compress", "parameters": {"quality": "high"}})),
    ];

    let delivery = harness
        .service
        .process(request(steps, ProcessingMode::Final), b"src")
        .await
        .unwrap();

    let inputs = harness.executor.inputs.lock().unwrap().clone();
    assert_eq!(inputs.len(), 2);
    assert_eq!(inputs[0], ("crop".to_string(), b"src".to_vec()));
    // compress read exactly what crop wrote
    assert_eq!(inputs[1], ("compress".to_string(), b"src|crop".to_vec()));

    let Delivery::Download(artifact) = delivery else {
        panic!("expected a download");
    };
    assert_eq!(artifact.bytes, b"src|crop|compress");
    assert_eq!(harness.leftover_files(), 0);
}

#[tokio::test]
async fn test_convert_renames_download() {
    let harness = Harness::new(ScriptedExecutor::default());
    let steps = vec![step(
        json!({"type": "convert", "parameters": {"outputFormat": "webm", "codec": "vp9"}}),
    )];

    let delivery = harness
        .service
        .process(request(steps, ProcessingMode::Final), b"src")
        .await
        .unwrap();

    let Delivery::Download(artifact) = delivery else {
        panic!("expected a download");
    };
    assert_eq!(artifact.file_name, "processed_holiday.webm");
    assert_eq!(artifact.content_type, "video/webm");
}

#[tokio::test]
async fn test_step_failure_stops_chain_and_cleans_up() {
    let harness = Harness::new(ScriptedExecutor {
        fail_on: Some("crop"),
        ..Default::default()
    });
    let steps = vec![
        step(json!({"type": "trim", "parameters": {"startTime": 5, "endTime": 15}})),
        step(json!({"type": "crop", "parameters": {"width": 1080, "height": 1920}})),
        step(json!({"type": "compress"})),
    ];

    let err = harness
        .service
        .process(request(steps, ProcessingMode::Final), b"src")
        .await
        .unwrap_err();

    assert_eq!(err.step_index(), Some(1));
    assert!(err.to_string().starts_with("Failed to process crop:"));
    // compress never ran
    assert_eq!(harness.executor.inputs.lock().unwrap().len(), 2);
    assert_eq!(harness.leftover_files(), 0);
}

#[tokio::test]
async fn test_subtitle_is_reported() {
    let harness = Harness::new(ScriptedExecutor::default());
    let steps = vec![step(json!({"type": "subtitle", "parameters": {"text": "hi"}}))];

    let err = harness
        .service
        .process(request(steps, ProcessingMode::Preview), b"src")
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::NotYetSupported { index: 0, .. }));
    assert_eq!(harness.leftover_files(), 0);
}

#[tokio::test]
async fn test_unknown_step_passes_through() {
    let harness = Harness::new(ScriptedExecutor::default());
    let steps = vec![
        step(json!({"type": "sparkle"})),
        step(json!({"type": "compress"})),
    ];

    let delivery = harness
        .service
        .process(request(steps, ProcessingMode::Final), b"src")
        .await
        .unwrap();

    let Delivery::Download(artifact) = delivery else {
        panic!("expected a download");
    };
    assert_eq!(artifact.bytes, b"src|compress");
}

#[tokio::test]
async fn test_remote_final_returns_confirmation_only() {
    let harness = Harness::new(ScriptedExecutor::default());
    let mut req = request(vec![step(json!({"type": "compress"}))], ProcessingMode::Final);
    req.destination = Some(s3_destination());

    let delivery = harness.service.process(req, b"src").await.unwrap();

    let Delivery::Uploaded(confirmation) = delivery else {
        panic!("expected an upload confirmation");
    };
    assert!(confirmation.success);
    assert_eq!(confirmation.provider, StorageProvider::S3);
    assert_eq!(confirmation.url.as_deref(), Some("s3://exports/processed_holiday.mp4"));

    let received = harness.storage.received.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].1, b"src|compress");
    // handed-off file is gone once the request returns
    assert!(!received[0].0.exists());
    assert_eq!(harness.leftover_files(), 0);
}

#[tokio::test]
async fn test_preview_never_uploads() {
    let harness = Harness::new(ScriptedExecutor::default());
    let mut req = request(vec![step(json!({"type": "compress"}))], ProcessingMode::Preview);
    req.destination = Some(s3_destination());

    let delivery = harness.service.process(req, b"src").await.unwrap();

    let Delivery::Download(artifact) = delivery else {
        panic!("expected a download");
    };
    assert!(artifact.file_name.starts_with("preview_"));
    assert!(artifact.file_name.ends_with(".mp4"));
    assert!(harness.storage.received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_requests_do_not_share_artifacts() {
    let harness = Harness::new(ScriptedExecutor::default());
    let steps = vec![step(json!({"type": "compress"}))];

    let (a, b) = tokio::join!(
        harness.service.process(request(steps.clone(), ProcessingMode::Final), b"first"),
        harness.service.process(request(steps, ProcessingMode::Final), b"second"),
    );

    let (Delivery::Download(a), Delivery::Download(b)) = (a.unwrap(), b.unwrap()) else {
        panic!("expected downloads");
    };
    assert_eq!(a.bytes, b"first|compress");
    assert_eq!(b.bytes, b"second|compress");
    assert_eq!(harness.leftover_files(), 0);
}
