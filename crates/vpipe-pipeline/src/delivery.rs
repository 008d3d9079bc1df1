//! Delivery selection: stream the artifact back or hand it to storage.

use std::path::Path;

use tracing::info;
use vpipe_models::{ContainerFormat, ProcessingMode, StorageDestination, UploadConfirmation};
use vpipe_storage::StorageCollaborator;

use crate::error::PipelineResult;
use crate::metrics;

/// Where a finished artifact goes.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryTarget {
    /// Return the bytes to the caller
    Download,
    /// Hand the file to a storage provider
    Remote(StorageDestination),
}

/// Remote delivery only happens for final runs with a non-local provider.
pub fn select_target(mode: ProcessingMode, destination: Option<&StorageDestination>) -> DeliveryTarget {
    match destination {
        Some(dest) if dest.is_remote() && !mode.is_preview() => DeliveryTarget::Remote(dest.clone()),
        _ => DeliveryTarget::Download,
    }
}

/// A finished artifact read into memory, ready to stream back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadArtifact {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Result of a pipeline request.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Download(DownloadArtifact),
    Uploaded(UploadConfirmation),
}

/// Name for the downloaded file.
///
/// Preview runs get `preview_<unix_ms>.<ext>`; final runs get
/// `processed_<originalName>`, with the extension swapped when a convert step
/// ran. The result is safe for a `Content-Disposition` header.
pub fn download_file_name(
    mode: ProcessingMode,
    original_name: &str,
    container: ContainerFormat,
    converted: bool,
    now_ms: i64,
) -> String {
    if mode.is_preview() {
        return format!("preview_{}.{}", now_ms, container.extension());
    }

    let original = sanitize_file_name(original_name);
    if !converted {
        return format!("processed_{}", original);
    }

    let stem = match original.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => original.as_str(),
    };
    format!("processed_{}.{}", stem, container.extension())
}

/// Keep the base name only and replace characters that cannot appear in a
/// quoted header parameter.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        "video".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Deliver `final_path` to `target`.
///
/// Downloads are read fully into memory so the file can be deleted before the
/// response goes out.
pub async fn deliver(
    target: DeliveryTarget,
    final_path: &Path,
    file_name: String,
    container: ContainerFormat,
    storage: &dyn StorageCollaborator,
) -> PipelineResult<Delivery> {
    match target {
        DeliveryTarget::Download => {
            let bytes = tokio::fs::read(final_path).await?;
            Ok(Delivery::Download(DownloadArtifact {
                file_name,
                content_type: container.content_type(),
                bytes,
            }))
        }
        DeliveryTarget::Remote(destination) => {
            let provider = destination.provider;
            match storage.store(final_path, &destination, &file_name).await {
                Ok(stored) => {
                    metrics::record_upload(provider.as_str(), "success");
                    info!(provider = %stored.provider, url = %stored.url, "Artifact handed to storage");
                    Ok(Delivery::Uploaded(UploadConfirmation::uploaded(stored.provider, stored.url)))
                }
                Err(e) => {
                    metrics::record_upload(provider.as_str(), "error");
                    Err(e.into())
                }
            }
        }
    }
}
