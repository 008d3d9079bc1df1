//! API error types.
//!
//! Every failure leaves the server as `{"error": "<message>"}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use vpipe_pipeline::PipelineError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    /// A declared step type the pipeline cannot run yet
    #[error("{0}")]
    NotYetSupported(String),

    /// A pipeline step failed
    #[error("{0}")]
    StepFailed(String),

    /// Processing succeeded but the storage handoff did not
    #[error("{0}")]
    Upload(String),

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotYetSupported(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::StepFailed(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Upload(_) => StatusCode::BAD_GATEWAY,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let message = err.to_string();
        match err {
            PipelineError::InvalidRequest(_) => Self::BadRequest(message),
            PipelineError::NotYetSupported { .. } => Self::NotYetSupported(message),
            PipelineError::Step { .. } => Self::StepFailed(message),
            PipelineError::Storage(_) => Self::Upload(message),
            PipelineError::Io(_) | PipelineError::Internal(_) => Self::Internal(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let error = match &self {
            ApiError::Internal(_) => {
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            _ => self.to_string(),
        };

        let mut response = (status, Json(ErrorResponse { error })).into_response();
        if status == StatusCode::TOO_MANY_REQUESTS {
            response
                .headers_mut()
                .insert("Retry-After", axum::http::HeaderValue::from_static("1"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vpipe_models::StepType;
    use vpipe_storage::StorageError;

    #[test]
    fn test_pipeline_error_mapping() {
        let cases = [
            (PipelineError::invalid_request("Video file is empty"), StatusCode::BAD_REQUEST),
            (
                PipelineError::NotYetSupported { index: 0, step_type: StepType::Subtitle },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                PipelineError::step(2, StepType::Crop, "exit status 1"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                PipelineError::from(StorageError::upload_failed("Dropbox returned 401")),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_step_message_kept_verbatim() {
        let err = ApiError::from(PipelineError::step(0, StepType::Crop, "exit status 1"));
        assert_eq!(err.to_string(), "Failed to process crop: exit status 1");
    }

    #[test]
    fn test_rate_limited_has_retry_after() {
        let response = ApiError::RateLimited.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["Retry-After"], "1");
    }
}
