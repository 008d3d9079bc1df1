//! Step pipeline execution.
//!
//! One [`PipelineService::process`] call owns one request end to end:
//! persist the upload, run the applied steps in order, deliver the result,
//! and delete every artifact it created.

pub mod artifacts;
pub mod config;
pub mod delivery;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod runner;
pub mod service;

pub use artifacts::{ArtifactSet, CleanupReport};
pub use config::PipelineConfig;
pub use delivery::{download_file_name, select_target, Delivery, DeliveryTarget, DownloadArtifact};
pub use error::{PipelineError, PipelineResult};
pub use logging::PipelineLogger;
pub use runner::{PipelineOutput, PipelineRunner};
pub use service::{PipelineRequest, PipelineService};
