//! Pipeline submission handler.

use axum::body::{Body, Bytes};
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::info;

use vpipe_models::{ProcessingMode, ProcessingStep, StorageDestination};
use vpipe_pipeline::{Delivery, DownloadArtifact, PipelineRequest};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Name used when the client sends the video without a file name.
const DEFAULT_UPLOAD_NAME: &str = "video.mp4";

/// Parsed multipart submission.
#[derive(Debug)]
struct PipelineForm {
    video: Bytes,
    file_name: String,
    steps: Vec<ProcessingStep>,
    preview: bool,
    storage: Option<StorageDestination>,
}

/// `POST /api/process-video-pipeline`
///
/// Fields: `video` (file), `steps` (JSON array), `preview` (`"true"`/`"false"`),
/// `storageConfig` (JSON destination descriptor).
pub async fn process_video_pipeline(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Response> {
    let multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let form = read_form(multipart).await?;

    metrics::record_upload_size(form.video.len());
    info!(
        file_name = %form.file_name,
        bytes = form.video.len(),
        steps = form.steps.len(),
        preview = form.preview,
        provider = ?form.storage.as_ref().map(|s| s.provider),
        "Pipeline submission received"
    );

    let request = PipelineRequest {
        steps: form.steps,
        mode: ProcessingMode::from_preview_flag(form.preview),
        destination: form.storage,
        original_name: form.file_name,
    };

    match state.pipeline.process(request, &form.video).await? {
        Delivery::Download(artifact) => download_response(artifact),
        Delivery::Uploaded(confirmation) => Ok(Json(confirmation).into_response()),
    }
}

async fn read_form(mut multipart: Multipart) -> ApiResult<PipelineForm> {
    let mut video = None;
    let mut file_name = None;
    let mut steps = Vec::new();
    let mut preview = false;
    let mut storage = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(|s| s.to_string()).unwrap_or_default();

        match name.as_str() {
            "video" => {
                if video.is_some() {
                    return Err(ApiError::bad_request("Only one video file may be submitted"));
                }
                file_name = field.file_name().map(|s| s.to_string());
                video = Some(field.bytes().await.map_err(multipart_error)?);
            }
            "steps" => {
                let text = field.text().await.map_err(multipart_error)?;
                steps = parse_steps(&text)?;
            }
            "preview" => {
                let text = field.text().await.map_err(multipart_error)?;
                preview = text.trim() == "true";
            }
            "storageConfig" => {
                let text = field.text().await.map_err(multipart_error)?;
                storage = parse_storage(&text)?;
            }
            _ => {}
        }
    }

    let video = video.ok_or_else(|| ApiError::bad_request("Video file is required"))?;
    let file_name = file_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_UPLOAD_NAME.to_string());

    Ok(PipelineForm {
        video,
        file_name,
        steps,
        preview,
        storage,
    })
}

fn parse_steps(text: &str) -> ApiResult<Vec<ProcessingStep>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(text).map_err(|e| ApiError::bad_request(format!("Invalid steps: {}", e)))
}

fn parse_storage(text: &str) -> ApiResult<Option<StorageDestination>> {
    let text = text.trim();
    if text.is_empty() || text == "null" {
        return Ok(None);
    }
    serde_json::from_str(text)
        .map(Some)
        .map_err(|e| ApiError::bad_request(format!("Invalid storageConfig: {}", e)))
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::bad_request(format!("Failed to read multipart: {}", e.body_text()))
    }
}

fn download_response(artifact: DownloadArtifact) -> ApiResult<Response> {
    let length = artifact.bytes.len();
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, artifact.content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", artifact.file_name),
        )
        .header(header::CONTENT_LENGTH, length)
        .body(Body::from(artifact.bytes))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}
