//! S3-compatible uploads (AWS S3, Cloudflare R2, MinIO).

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use vpipe_models::{StorageDestination, StorageProvider};

use crate::collaborator::{content_type_for, object_name, timestamped, StorageCollaborator, StoredObject};
use crate::error::{StorageError, StorageResult};

/// Configuration for the S3 uploader.
#[derive(Clone)]
pub struct S3Config {
    /// S3 API endpoint. `None` targets AWS itself.
    pub endpoint_url: Option<String>,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Default bucket name
    pub bucket_name: String,
    /// Region ("auto" for R2)
    pub region: String,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint_url", &self.endpoint_url)
            .field("bucket_name", &self.bucket_name)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("S3_ENDPOINT_URL").ok().filter(|s| !s.is_empty()),
            access_key_id: std::env::var("S3_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("S3_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("S3_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("S3_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("S3_BUCKET_NAME not set"))?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

/// Uploads artifacts to an S3-compatible bucket with server-side credentials.
#[derive(Clone)]
pub struct S3Uploader {
    client: Client,
    bucket: String,
    endpoint_url: Option<String>,
}

impl S3Uploader {
    /// Create a new uploader from configuration.
    pub fn new(config: S3Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "vpipe-s3",
        );

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials);

        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket_name,
            endpoint_url: config.endpoint_url,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(S3Config::from_env()?))
    }

    /// Upload a file to `bucket`/`key`.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        let path = path.as_ref();
        debug!("Uploading {} to {}/{}", path.display(), bucket, key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {} to {}/{}", path.display(), bucket, key);
        Ok(())
    }

    /// Location reported back to the caller.
    fn object_url(&self, bucket: &str, key: &str) -> String {
        match &self.endpoint_url {
            Some(endpoint) => format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                bucket,
                urlencoding::encode(key).replace("%2F", "/")
            ),
            None => format!("s3://{}/{}", bucket, key),
        }
    }
}

/// Join a descriptor prefix and an object name into a key.
fn object_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

#[async_trait]
impl StorageCollaborator for S3Uploader {
    async fn store(
        &self,
        local_path: &Path,
        destination: &StorageDestination,
        original_name: &str,
    ) -> StorageResult<StoredObject> {
        let section = destination.s3.clone().unwrap_or_default();
        let bucket = section.bucket.as_deref().unwrap_or(&self.bucket);
        let name = object_name(original_name);
        let key = object_key(&section.prefix, &timestamped(&name));

        self.upload_file(local_path, bucket, &key, content_type_for(&name))
            .await?;

        Ok(StoredObject {
            provider: StorageProvider::S3,
            url: self.object_url(bucket, &key),
        })
    }
}
