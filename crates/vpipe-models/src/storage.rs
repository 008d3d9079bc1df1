//! Storage destination descriptors.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Where a final artifact should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    /// Stream the bytes back to the caller
    #[default]
    Local,
    /// S3-compatible object storage (AWS S3, Cloudflare R2)
    S3,
    Dropbox,
    Supabase,
    #[serde(rename = "googledrive")]
    GoogleDrive,
    Airtable,
}

impl StorageProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::S3 => "s3",
            Self::Dropbox => "dropbox",
            Self::Supabase => "supabase",
            Self::GoogleDrive => "googledrive",
            Self::Airtable => "airtable",
        }
    }

    pub fn is_remote(self) -> bool {
        !matches!(self, Self::Local)
    }
}

impl std::fmt::Display for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage destination descriptor submitted alongside a pipeline request.
///
/// Only the section matching `provider` is read.
#[derive(Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct StorageDestination {
    pub provider: StorageProvider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Destination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropbox: Option<DropboxDestination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supabase: Option<SupabaseDestination>,
}

impl StorageDestination {
    pub fn local() -> Self {
        Self::default()
    }

    pub fn is_remote(&self) -> bool {
        self.provider.is_remote()
    }
}

// Credentials must never reach the logs.
impl std::fmt::Debug for StorageDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageDestination")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

/// S3-compatible destination. Credentials come from server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct S3Destination {
    /// Overrides the configured bucket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    /// Key prefix (e.g. "exports/")
    #[serde(default)]
    pub prefix: String,
}

#[derive(Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct DropboxDestination {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub folder: Option<String>,
}

#[derive(Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct SupabaseDestination {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub anon_key: Option<String>,
    #[serde(default)]
    pub bucket_name: Option<String>,
}

/// Confirmation returned when an artifact was handed to a storage provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UploadConfirmation {
    pub success: bool,
    pub provider: StorageProvider,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl UploadConfirmation {
    pub fn uploaded(provider: StorageProvider, url: impl Into<String>) -> Self {
        Self {
            success: true,
            provider,
            message: format!("Video processed and uploaded to {}", provider),
            url: Some(url.into()),
        }
    }
}
