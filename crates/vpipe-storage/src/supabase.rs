//! Supabase Storage uploads through the REST API.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use vpipe_models::{StorageDestination, StorageProvider};

use crate::collaborator::{content_type_for, object_name, timestamped, StorageCollaborator, StoredObject};
use crate::error::{StorageError, StorageResult};

/// Bucket used when the descriptor does not name one.
pub const DEFAULT_SUPABASE_BUCKET: &str = "videos";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(rename = "Key")]
    key: Option<String>,
}

/// Uploads artifacts with a caller-supplied project URL and anon key.
#[derive(Clone)]
pub struct SupabaseUploader {
    http: Client,
}

impl SupabaseUploader {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl StorageCollaborator for SupabaseUploader {
    async fn store(
        &self,
        local_path: &Path,
        destination: &StorageDestination,
        original_name: &str,
    ) -> StorageResult<StoredObject> {
        let section = destination.supabase.clone().unwrap_or_default();
        let (Some(project_url), Some(anon_key)) = (
            section.url.filter(|u| !u.is_empty()),
            section.anon_key.filter(|k| !k.is_empty()),
        ) else {
            return Err(StorageError::config_error("Supabase credentials not configured"));
        };

        let bucket = section
            .bucket_name
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| DEFAULT_SUPABASE_BUCKET.to_string());
        let name = object_name(original_name);
        let object = timestamped(&name);

        let endpoint = format!(
            "{}/storage/v1/object/{}/{}",
            project_url.trim_end_matches('/'),
            urlencoding::encode(&bucket),
            urlencoding::encode(&object)
        );

        let body = tokio::fs::read(local_path).await?;
        debug!("Uploading {} bytes to Supabase bucket {}", body.len(), bucket);

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&anon_key)
            .header("apikey", &anon_key)
            .header(reqwest::header::CONTENT_TYPE, content_type_for(&name))
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(StorageError::upload_failed(format!(
                "Supabase returned {}: {}",
                status, text
            )));
        }

        let uploaded: UploadResponse = response.json().await?;
        let url = uploaded
            .key
            .unwrap_or_else(|| format!("{}/{}", bucket, object));

        info!("Uploaded {} to Supabase at {}", local_path.display(), url);
        Ok(StoredObject {
            provider: StorageProvider::Supabase,
            url,
        })
    }
}
