//! Dispatch uploads to the provider named in the destination descriptor.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};

use vpipe_models::{StorageDestination, StorageProvider};

use crate::collaborator::{StorageCollaborator, StoredObject};
use crate::dropbox::DropboxUploader;
use crate::error::{StorageError, StorageResult};
use crate::s3::S3Uploader;
use crate::supabase::SupabaseUploader;

/// Routes each upload to the matching provider client.
///
/// S3 is only available when server-side credentials are configured;
/// Dropbox and Supabase take their credentials from the descriptor.
#[derive(Clone)]
pub struct StorageRouter {
    s3: Option<S3Uploader>,
    dropbox: DropboxUploader,
    supabase: SupabaseUploader,
}

impl StorageRouter {
    pub fn new(http: Client) -> Self {
        Self {
            s3: None,
            dropbox: DropboxUploader::new(http.clone()),
            supabase: SupabaseUploader::new(http),
        }
    }

    pub fn with_s3(mut self, s3: S3Uploader) -> Self {
        self.s3 = Some(s3);
        self
    }

    /// Build from environment. A missing S3 configuration disables S3 uploads
    /// instead of failing startup.
    pub fn from_env(http: Client) -> Self {
        let router = Self::new(http);
        match S3Uploader::from_env() {
            Ok(s3) => {
                info!("S3 storage enabled");
                router.with_s3(s3)
            }
            Err(e) => {
                info!("S3 storage disabled: {}", e);
                router
            }
        }
    }

    pub fn has_s3(&self) -> bool {
        self.s3.is_some()
    }
}

#[async_trait]
impl StorageCollaborator for StorageRouter {
    async fn store(
        &self,
        local_path: &Path,
        destination: &StorageDestination,
        original_name: &str,
    ) -> StorageResult<StoredObject> {
        match destination.provider {
            StorageProvider::S3 => match &self.s3 {
                Some(s3) => s3.store(local_path, destination, original_name).await,
                None => Err(StorageError::config_error("S3 storage is not configured")),
            },
            StorageProvider::Dropbox => {
                self.dropbox.store(local_path, destination, original_name).await
            }
            StorageProvider::Supabase => {
                self.supabase.store(local_path, destination, original_name).await
            }
            provider @ (StorageProvider::GoogleDrive
            | StorageProvider::Airtable
            | StorageProvider::Local) => {
                warn!(provider = %provider, "Rejected upload to unsupported provider");
                Err(StorageError::UnsupportedProvider(provider))
            }
        }
    }
}
