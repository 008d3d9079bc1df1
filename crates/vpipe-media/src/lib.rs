//! FFmpeg CLI wrapper for the step pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - Frame probing with a fixed fallback size
//! - Crop geometry and watermark filter graphs
//! - The [`StepExecutor`] seam used by the pipeline runner

pub mod command;
pub mod error;
pub mod executor;
pub mod filters;
pub mod fs_utils;
pub mod geometry;
pub mod probe;
pub mod progress;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use executor::{FfmpegStepExecutor, Reframe, StepExecutor, StepPlan};
pub use geometry::{fit_within, resolve_crop, FrameSize};
pub use probe::{probe_video, FfprobeProbe, MediaProbe, VideoInfo};
pub use progress::FfmpegProgress;
