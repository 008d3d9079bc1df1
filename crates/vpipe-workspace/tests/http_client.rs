//! Workspace against a mocked pipeline API.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vpipe_models::StepType;
use vpipe_workspace::{
    ExportOutcome, HttpPipelineClient, PipelineClient, PipelineReply, PipelineSubmission, Workspace,
    WorkspaceClientConfig, WorkspaceError, WorkspacePhase,
};

const ENDPOINT: &str = "/api/process-video-pipeline";

fn client(server: &MockServer) -> HttpPipelineClient {
    HttpPipelineClient::new(WorkspaceClientConfig {
        base_url: server.uri(),
        timeout: Duration::from_secs(10),
    })
    .unwrap()
}

#[tokio::test]
async fn test_preview_submission_and_video_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(body_string_contains("name=\"preview\"\r\n\r\ntrue"))
        .and(body_string_contains("\"type\":\"compress\""))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "video/mp4")
                .insert_header("Content-Disposition", "attachment; filename=\"preview_1700000000000.mp4\"")
                .set_body_bytes(b"rendered".to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let ws = Workspace::new(client(&server), dir.path());
    ws.load_video("clip.mp4", Bytes::from_static(b"source"), None).await.unwrap();
    ws.add_step(StepType::Compress, "Compress", json!({"quality": "low"})).await;

    ws.generate_preview().await.unwrap();

    assert!(ws.has_rendered_preview().await);
    assert_eq!(ws.registry().live_handles(), 2);
}

#[tokio::test]
async fn test_error_body_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"error": "Failed to process crop: exit status 1"})),
        )
        .mount(&server)
        .await;

    let reply = client(&server)
        .submit(PipelineSubmission {
            video: Bytes::from_static(b"source"),
            file_name: "clip.mp4".to_string(),
            steps: Vec::new(),
            mode: vpipe_models::ProcessingMode::Final,
            destination: None,
        })
        .await;

    match reply {
        Err(WorkspaceError::Server { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "Failed to process crop: exit status 1");
        }
        other => panic!("unexpected reply: {:?}", other),
    }
}

#[tokio::test]
async fn test_remote_export_reads_confirmation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(body_string_contains("name=\"storageConfig\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "provider": "dropbox",
            "message": "Video processed and uploaded to dropbox",
            "url": "/SocialSync/processed_clip.mp4"
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let ws = Workspace::new(client(&server), dir.path());
    ws.load_video("clip.mp4", Bytes::from_static(b"source"), None).await.unwrap();
    let destination = serde_json::from_value(json!({
        "provider": "dropbox",
        "dropbox": {"accessToken": "token"}
    }))
    .unwrap();

    let outcome = ws.export_final_video(Some(destination)).await.unwrap();

    let ExportOutcome::Uploaded(confirmation) = outcome else {
        panic!("expected a confirmation");
    };
    assert_eq!(confirmation.url.as_deref(), Some("/SocialSync/processed_clip.mp4"));
}

#[tokio::test]
async fn test_busy_workspace_rejects_reentry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "video/mp4")
                .set_body_bytes(b"rendered".to_vec())
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let ws = Arc::new(Workspace::new(client(&server), dir.path()));
    ws.load_video("clip.mp4", Bytes::from_static(b"source"), None).await.unwrap();
    ws.add_step(StepType::Compress, "Compress", json!({})).await;

    let background = {
        let ws = Arc::clone(&ws);
        tokio::spawn(async move { ws.generate_preview().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(ws.phase().await, WorkspacePhase::Previewing);
    assert!(matches!(ws.export_final_video(None).await, Err(WorkspaceError::Busy)));
    assert!(matches!(
        ws.load_video("other.mp4", Bytes::from_static(b"x"), None).await,
        Err(WorkspaceError::Busy)
    ));

    background.await.unwrap().unwrap();
    assert_eq!(ws.phase().await, WorkspacePhase::Loaded);
}

#[tokio::test]
async fn test_reply_without_disposition() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "video/webm")
                .set_body_bytes(b"webm".to_vec()),
        )
        .mount(&server)
        .await;

    let reply = client(&server)
        .submit(PipelineSubmission {
            video: Bytes::from_static(b"source"),
            file_name: "clip.webm".to_string(),
            steps: Vec::new(),
            mode: vpipe_models::ProcessingMode::Final,
            destination: None,
        })
        .await
        .unwrap();

    assert_eq!(
        reply,
        PipelineReply::Video {
            bytes: Bytes::from_static(b"webm"),
            file_name: None,
            content_type: "video/webm".to_string(),
        }
    );
}
