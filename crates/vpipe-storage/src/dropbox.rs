//! Dropbox uploads through the content API.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use vpipe_models::{StorageDestination, StorageProvider};

use crate::collaborator::{object_name, StorageCollaborator, StoredObject};
use crate::error::{StorageError, StorageResult};

/// Dropbox content API host.
pub const DROPBOX_CONTENT_URL: &str = "https://content.dropboxapi.com";

/// Folder used when the descriptor does not name one.
pub const DEFAULT_DROPBOX_FOLDER: &str = "/SocialSync";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    path_display: Option<String>,
}

/// Uploads artifacts with a caller-supplied Dropbox access token.
#[derive(Clone)]
pub struct DropboxUploader {
    http: Client,
    base_url: String,
}

impl DropboxUploader {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: DROPBOX_CONTENT_URL.to_string(),
        }
    }

    /// Point at a different content host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Normalise a folder to `/a/b` form.
fn folder_path(folder: Option<&str>) -> String {
    let folder = folder
        .map(|f| f.trim().trim_end_matches('/'))
        .filter(|f| !f.is_empty())
        .unwrap_or(DEFAULT_DROPBOX_FOLDER);

    if folder.starts_with('/') {
        folder.to_string()
    } else {
        format!("/{}", folder)
    }
}

/// JSON for the `Dropbox-API-Arg` header. Non-ASCII characters must be escaped
/// because header values are ASCII only.
fn header_safe_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    for c in value.to_string().chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut buf = [0u16; 2];
            for unit in c.encode_utf16(&mut buf) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}

#[async_trait]
impl StorageCollaborator for DropboxUploader {
    async fn store(
        &self,
        local_path: &Path,
        destination: &StorageDestination,
        original_name: &str,
    ) -> StorageResult<StoredObject> {
        let section = destination.dropbox.clone().unwrap_or_default();
        let token = section
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| StorageError::config_error("Dropbox access token not configured"))?;

        let target = format!(
            "{}/{}",
            folder_path(section.folder.as_deref()),
            object_name(original_name)
        );
        let arg = json!({
            "path": target,
            "mode": "add",
            "autorename": true,
            "mute": false
        });

        let body = tokio::fs::read(local_path).await?;
        debug!("Uploading {} bytes to Dropbox at {}", body.len(), target);

        let response = self
            .http
            .post(format!("{}/2/files/upload", self.base_url.trim_end_matches('/')))
            .bearer_auth(token)
            .header("Dropbox-API-Arg", header_safe_json(&arg))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(StorageError::upload_failed(format!(
                "Dropbox returned {}: {}",
                status, text
            )));
        }

        let uploaded: UploadResponse = response.json().await?;
        let url = uploaded.path_display.unwrap_or(target);

        info!("Uploaded {} to Dropbox at {}", local_path.display(), url);
        Ok(StoredObject {
            provider: StorageProvider::Dropbox,
            url,
        })
    }
}
