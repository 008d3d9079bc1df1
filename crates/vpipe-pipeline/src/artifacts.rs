//! Request-scoped artifact tracking.
//!
//! Every file a request creates is registered here before anything writes to
//! it, so partially written outputs are covered too. [`ArtifactSet::cleanup`]
//! consumes the set; a set dropped without cleanup deletes its files
//! synchronously in `Drop`.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;
use vpipe_media::fs_utils;

/// Outcome of a cleanup pass. Failures are reported, never raised.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub missing: usize,
    pub failed: Vec<PathBuf>,
}

/// Files owned by one pipeline request.
#[derive(Debug)]
pub struct ArtifactSet {
    work_dir: PathBuf,
    paths: Vec<PathBuf>,
}

impl ArtifactSet {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            paths: Vec::new(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Reserve and track a fresh, collision-free path:
    /// `<work_dir>/<prefix>_<unix_ms>_<uuid>.<ext>`.
    pub fn allocate(&mut self, prefix: &str, extension: &str) -> PathBuf {
        let path = self.work_dir.join(format!(
            "{}_{}_{}.{}",
            prefix,
            chrono::Utc::now().timestamp_millis(),
            Uuid::new_v4().simple(),
            extension
        ));
        self.paths.push(path.clone());
        path
    }

    /// Write the uploaded bytes to a tracked file.
    pub async fn persist_upload(&mut self, bytes: &[u8], extension: &str) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let path = self.allocate("input", extension);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Paths tracked so far, in creation order.
    pub fn tracked(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Delete every tracked file.
    pub async fn cleanup(mut self) -> CleanupReport {
        let mut report = CleanupReport::default();

        for path in std::mem::take(&mut self.paths) {
            match fs_utils::remove_if_exists(&path).await {
                Ok(true) => report.removed += 1,
                Ok(false) => report.missing += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to delete artifact");
                    report.failed.push(path);
                }
            }
        }

        debug!(
            removed = report.removed,
            missing = report.missing,
            failed = report.failed.len(),
            "Artifact cleanup finished"
        );
        report
    }
}

impl Drop for ArtifactSet {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "Removed artifact on drop"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete artifact on drop"),
            }
        }
    }
}
