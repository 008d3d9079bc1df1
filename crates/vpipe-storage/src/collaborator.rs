//! The storage seam.

use async_trait::async_trait;
use std::path::Path;

use vpipe_models::{ContainerFormat, StorageDestination, StorageProvider};

use crate::error::StorageResult;

/// Where an artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub provider: StorageProvider,
    /// Provider-specific location (URL, object key or path)
    pub url: String,
}

/// Accepts a finished artifact and stores it at a destination.
#[async_trait]
pub trait StorageCollaborator: Send + Sync {
    async fn store(
        &self,
        local_path: &Path,
        destination: &StorageDestination,
        original_name: &str,
    ) -> StorageResult<StoredObject>;
}

/// Object name safe for keys, paths and headers.
///
/// Anything other than ASCII alphanumerics, `.`, `-` and `_` becomes `_`.
pub fn object_name(original_name: &str) -> String {
    let base = original_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(original_name);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "video.mp4".to_string()
    } else {
        cleaned.to_string()
    }
}

/// MIME type for an object, from its extension.
pub(crate) fn content_type_for(name: &str) -> &'static str {
    ContainerFormat::from_file_name(name)
        .unwrap_or_default()
        .content_type()
}

/// Prefix `name` with the current Unix time in milliseconds.
pub(crate) fn timestamped(name: &str) -> String {
    format!("{}-{}", chrono::Utc::now().timestamp_millis(), name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_name_sanitizes() {
        assert_eq!(object_name("processed_my clip.mp4"), "processed_my_clip.mp4");
        assert_eq!(object_name("../../etc/passwd"), "passwd");
        assert_eq!(object_name("vidéo.webm"), "vid_o.webm");
        assert_eq!(object_name(""), "video.mp4");
        assert_eq!(object_name("..."), "video.mp4");
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("a.webm"), "video/webm");
        assert_eq!(content_type_for("a.mov"), "video/quicktime");
        assert_eq!(content_type_for("noext"), "video/mp4");
    }
}
