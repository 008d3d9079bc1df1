//! Editing workspace state machine.
//!
//! ```text
//! Idle --load_video--> Loaded --generate_preview--> Previewing --> Loaded
//!                        |  ^--------------------------------------'
//!                        '--export_final_video--> Exporting --> Loaded
//! ```
//!
//! Step list edits never trigger rendering; previews are regenerated only on
//! an explicit [`Workspace::generate_preview`] call.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{info, warn};

use vpipe_models::{
    ContainerFormat, ProcessingMode, ProcessingStep, StepType, StorageDestination,
    UploadConfirmation,
};

use crate::client::{PipelineClient, PipelineReply, PipelineSubmission};
use crate::error::{WorkspaceError, WorkspaceResult};
use crate::handle::{HandleRegistry, MediaHandle};

const IDLE: u8 = 0;
const PREVIEWING: u8 = 1;
const EXPORTING: u8 = 2;
const LOADING: u8 = 3;

/// Coarse workspace state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspacePhase {
    Idle,
    Loaded,
    Previewing,
    Exporting,
}

/// What the preview player shows.
#[derive(Debug)]
pub enum Preview {
    /// The loaded video itself; shares its handle
    Original,
    /// A rendered preview with its own handle
    Rendered(MediaHandle),
}

/// Result of an export.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    /// Written to the download directory
    Saved(PathBuf),
    Uploaded(UploadConfirmation),
}

#[derive(Debug)]
struct LoadedVideo {
    handle: MediaHandle,
    duration: Option<f64>,
}

#[derive(Debug, Default)]
struct State {
    video: Option<LoadedVideo>,
    steps: Vec<ProcessingStep>,
    preview: Option<Preview>,
}

impl State {
    fn applied_steps(&self) -> Vec<ProcessingStep> {
        self.steps.iter().filter(|s| s.applied).cloned().collect()
    }

    fn step_mut(&mut self, id: &str) -> WorkspaceResult<&mut ProcessingStep> {
        self.steps
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| WorkspaceError::StepNotFound(id.to_string()))
    }
}

/// One editing session: a video, its step list and its preview.
pub struct Workspace<C> {
    client: C,
    registry: HandleRegistry,
    download_dir: PathBuf,
    state: Mutex<State>,
    activity: AtomicU8,
}

impl<C: PipelineClient> Workspace<C> {
    pub fn new(client: C, download_dir: impl Into<PathBuf>) -> Self {
        Self::with_registry(client, download_dir, HandleRegistry::new())
    }

    pub fn with_registry(client: C, download_dir: impl Into<PathBuf>, registry: HandleRegistry) -> Self {
        Self {
            client,
            registry,
            download_dir: download_dir.into(),
            state: Mutex::new(State::default()),
            activity: AtomicU8::new(IDLE),
        }
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// Load a new video. The previous video and preview are released and the
    /// step list starts over.
    pub async fn load_video(
        &self,
        name: impl Into<String>,
        bytes: Bytes,
        duration: Option<f64>,
    ) -> WorkspaceResult<()> {
        let _busy = self.begin(LOADING)?;
        let handle = self.registry.issue(name, bytes);
        info!(name = %handle.name(), bytes = handle.len(), "Video loaded");

        let mut state = self.state.lock().await;
        state.preview = Some(Preview::Original);
        state.video = Some(LoadedVideo { handle, duration });
        state.steps.clear();
        Ok(())
    }

    /// Unload the video and release every handle.
    pub async fn clear_video(&self) -> WorkspaceResult<()> {
        let _busy = self.begin(LOADING)?;
        *self.state.lock().await = State::default();
        Ok(())
    }

    /// Append an applied step; returns its id.
    pub async fn add_step(&self, step_type: StepType, name: impl Into<String>, parameters: Value) -> String {
        let step = ProcessingStep::new(step_type, name, parameters);
        let id = step.id.clone();
        self.state.lock().await.steps.push(step);
        id
    }

    /// Remove a step. Returns whether it existed.
    pub async fn remove_step(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        let before = state.steps.len();
        state.steps.retain(|s| s.id != id);
        state.steps.len() != before
    }

    /// Flip a step's `applied` flag; returns the new value.
    pub async fn toggle_step(&self, id: &str) -> WorkspaceResult<bool> {
        let mut state = self.state.lock().await;
        let step = state.step_mut(id)?;
        step.applied = !step.applied;
        Ok(step.applied)
    }

    /// Shallow-merge `patch` into the step's parameters.
    pub async fn update_step_parameters(&self, id: &str, patch: Value) -> WorkspaceResult<()> {
        let Value::Object(patch) = patch else {
            return Err(WorkspaceError::InvalidParameters(
                "parameter update must be a JSON object".to_string(),
            ));
        };

        let mut state = self.state.lock().await;
        let step = state.step_mut(id)?;
        match &mut step.parameters {
            Value::Object(current) => current.extend(patch),
            other => *other = Value::Object(patch),
        }
        Ok(())
    }

    /// Re-render the preview from the applied steps.
    ///
    /// With no applied steps the preview falls back to the original video
    /// without a server round trip.
    pub async fn generate_preview(&self) -> WorkspaceResult<()> {
        let _busy = self.begin(PREVIEWING)?;

        let (video, file_name, steps) = self.snapshot().await?;
        if steps.is_empty() {
            self.state.lock().await.preview = Some(Preview::Original);
            return Ok(());
        }

        let reply = self
            .client
            .submit(PipelineSubmission {
                video,
                file_name,
                steps,
                mode: ProcessingMode::Preview,
                destination: None,
            })
            .await?;

        let PipelineReply::Video { bytes, file_name, .. } = reply else {
            return Err(WorkspaceError::InvalidResponse(
                "preview request returned an upload confirmation".to_string(),
            ));
        };

        let handle = self
            .registry
            .issue(file_name.unwrap_or_else(|| "preview.mp4".to_string()), bytes);
        info!(url = %handle.url(), bytes = handle.len(), "Preview regenerated");

        // Replacing the field drops the previous rendered preview
        self.state.lock().await.preview = Some(Preview::Rendered(handle));
        Ok(())
    }

    /// Render at full quality and deliver locally or to `destination`.
    pub async fn export_final_video(
        &self,
        destination: Option<StorageDestination>,
    ) -> WorkspaceResult<ExportOutcome> {
        let _busy = self.begin(EXPORTING)?;

        let (video, file_name, steps) = self.snapshot().await?;
        let reply = self
            .client
            .submit(PipelineSubmission {
                video,
                file_name: file_name.clone(),
                steps,
                mode: ProcessingMode::Final,
                destination,
            })
            .await?;

        match reply {
            PipelineReply::Uploaded(confirmation) => {
                info!(provider = %confirmation.provider, "{}", confirmation.message);
                Ok(ExportOutcome::Uploaded(confirmation))
            }
            PipelineReply::Video { bytes, file_name: served_name, .. } => {
                let extension = served_name
                    .as_deref()
                    .and_then(ContainerFormat::from_file_name)
                    .unwrap_or_default()
                    .extension();
                let path = self.download_dir.join(export_file_name(&file_name, extension));

                tokio::fs::create_dir_all(&self.download_dir).await?;
                tokio::fs::write(&path, &bytes).await?;
                info!(path = %path.display(), bytes = bytes.len(), "Export saved");
                Ok(ExportOutcome::Saved(path))
            }
        }
    }

    pub async fn has_video(&self) -> bool {
        self.state.lock().await.video.is_some()
    }

    pub async fn steps(&self) -> Vec<ProcessingStep> {
        self.state.lock().await.steps.clone()
    }

    pub async fn applied_steps(&self) -> Vec<ProcessingStep> {
        self.state.lock().await.applied_steps()
    }

    /// A video is loaded and at least one step is applied.
    pub async fn can_export(&self) -> bool {
        let state = self.state.lock().await;
        state.video.is_some() && state.steps.iter().any(|s| s.applied)
    }

    /// Locator of whatever the preview player should show.
    pub async fn preview_url(&self) -> Option<String> {
        let state = self.state.lock().await;
        match (&state.preview, &state.video) {
            (Some(Preview::Rendered(handle)), _) => Some(handle.url()),
            (Some(Preview::Original), Some(video)) => Some(video.handle.url()),
            _ => None,
        }
    }

    /// Whether the preview currently is a rendered artifact.
    pub async fn has_rendered_preview(&self) -> bool {
        matches!(self.state.lock().await.preview, Some(Preview::Rendered(_)))
    }

    pub async fn video_duration(&self) -> Option<f64> {
        self.state.lock().await.video.as_ref().and_then(|v| v.duration)
    }

    pub async fn phase(&self) -> WorkspacePhase {
        match self.activity.load(Ordering::SeqCst) {
            PREVIEWING => WorkspacePhase::Previewing,
            EXPORTING => WorkspacePhase::Exporting,
            _ if self.has_video().await => WorkspacePhase::Loaded,
            _ => WorkspacePhase::Idle,
        }
    }

    pub fn is_processing(&self) -> bool {
        self.activity.load(Ordering::SeqCst) != IDLE
    }

    /// Claim the busy flag; it is released when the guard drops, on every
    /// return path.
    fn begin(&self, activity: u8) -> WorkspaceResult<scopeguard::ScopeGuard<(), impl FnOnce(()) + '_>> {
        self.activity
            .compare_exchange(IDLE, activity, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| {
                warn!("Rejected workspace call while processing");
                WorkspaceError::Busy
            })?;
        Ok(scopeguard::guard((), move |()| {
            self.activity.store(IDLE, Ordering::SeqCst);
        }))
    }

    /// Video bytes, name and applied steps as of now.
    async fn snapshot(&self) -> WorkspaceResult<(Bytes, String, Vec<ProcessingStep>)> {
        let state = self.state.lock().await;
        let video = state.video.as_ref().ok_or(WorkspaceError::NoVideo)?;
        Ok((video.handle.bytes(), video.handle.name().to_string(), state.applied_steps()))
    }
}

/// `<stem>_processed.<ext>` for a locally saved export.
fn export_file_name(original: &str, extension: &str) -> String {
    let stem = Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("video");
    format!("{}_processed.{}", stem, extension)
}
