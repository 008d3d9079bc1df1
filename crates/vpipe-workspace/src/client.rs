//! Pipeline API client.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::debug;

use vpipe_models::{
    ContainerFormat, ProcessingMode, ProcessingStep, StorageDestination, UploadConfirmation,
};

use crate::error::{WorkspaceError, WorkspaceResult};

/// One pipeline submission.
#[derive(Debug, Clone)]
pub struct PipelineSubmission {
    pub video: Bytes,
    pub file_name: String,
    /// Applied steps in execution order
    pub steps: Vec<ProcessingStep>,
    pub mode: ProcessingMode,
    pub destination: Option<StorageDestination>,
}

/// What the pipeline sent back.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineReply {
    Video {
        bytes: Bytes,
        /// From `Content-Disposition`, when present
        file_name: Option<String>,
        content_type: String,
    },
    Uploaded(UploadConfirmation),
}

/// Anything that can run a pipeline for the workspace.
#[async_trait]
pub trait PipelineClient: Send + Sync {
    async fn submit(&self, submission: PipelineSubmission) -> WorkspaceResult<PipelineReply>;
}

/// Configuration for the HTTP client.
#[derive(Debug, Clone)]
pub struct WorkspaceClientConfig {
    /// Base URL of the pipeline API
    pub base_url: String,
    /// Request timeout; uploads and final renders can take a while
    pub timeout: Duration,
}

impl Default for WorkspaceClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout: Duration::from_secs(1800), // 30 minutes
        }
    }
}

impl WorkspaceClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("VPIPE_API_URL").unwrap_or(defaults.base_url),
            timeout: std::env::var("VPIPE_API_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Submits pipelines to `POST /api/process-video-pipeline`.
pub struct HttpPipelineClient {
    http: Client,
    config: WorkspaceClientConfig,
}

impl HttpPipelineClient {
    pub fn new(config: WorkspaceClientConfig) -> WorkspaceResult<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> WorkspaceResult<Self> {
        Self::new(WorkspaceClientConfig::from_env())
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/api/process-video-pipeline",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn build_form(submission: PipelineSubmission) -> WorkspaceResult<Form> {
        let content_type = ContainerFormat::from_file_name(&submission.file_name)
            .unwrap_or_default()
            .content_type();
        let length = submission.video.len() as u64;
        let video = Part::stream_with_length(submission.video, length)
            .file_name(submission.file_name)
            .mime_str(content_type)?;

        let mut form = Form::new()
            .part("video", video)
            .text("steps", serde_json::to_string(&submission.steps)?)
            .text("preview", submission.mode.is_preview().to_string());

        if let Some(destination) = &submission.destination {
            form = form.text("storageConfig", serde_json::to_string(destination)?);
        }
        Ok(form)
    }

    async fn read_reply(response: Response) -> WorkspaceResult<PipelineReply> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(body);
            return Err(WorkspaceError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        if content_type.starts_with("application/json") {
            let confirmation: UploadConfirmation = response.json().await?;
            return Ok(PipelineReply::Uploaded(confirmation));
        }

        let file_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(attachment_file_name);
        let bytes = response.bytes().await?;

        Ok(PipelineReply::Video {
            bytes,
            file_name,
            content_type,
        })
    }
}

#[async_trait]
impl PipelineClient for HttpPipelineClient {
    async fn submit(&self, submission: PipelineSubmission) -> WorkspaceResult<PipelineReply> {
        let url = self.endpoint();
        debug!(
            url = %url,
            mode = %submission.mode,
            steps = submission.steps.len(),
            bytes = submission.video.len(),
            "Submitting pipeline"
        );

        let form = Self::build_form(submission)?;
        let response = self.http.post(&url).multipart(form).send().await?;
        Self::read_reply(response).await
    }
}

/// `filename` parameter of an `attachment` disposition.
fn attachment_file_name(disposition: &str) -> Option<String> {
    disposition.split(';').map(str::trim).find_map(|param| {
        let value = param.strip_prefix("filename=")?;
        let value = value.trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}
