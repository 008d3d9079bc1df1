//! Client-side editing workspace for the video step pipeline.
//!
//! A [`Workspace`] holds one loaded video, its editable step list and the
//! current preview. Rendering goes through a [`PipelineClient`], normally the
//! [`HttpPipelineClient`] talking to `vpipe-api`.

pub mod client;
pub mod error;
pub mod handle;
pub mod workspace;

pub use client::{
    HttpPipelineClient, PipelineClient, PipelineReply, PipelineSubmission, WorkspaceClientConfig,
};
pub use error::{WorkspaceError, WorkspaceResult};
pub use handle::{HandleRegistry, MediaHandle};
pub use workspace::{ExportOutcome, Preview, Workspace, WorkspacePhase};
