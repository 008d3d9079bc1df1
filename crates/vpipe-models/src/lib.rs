//! Shared data models for the VPipe video pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Processing steps and their typed parameters
//! - Processing modes (preview/final)
//! - Encoding configuration and quality mappings
//! - Storage destination descriptors and upload confirmations

pub mod encoding;
pub mod mode;
pub mod rect;
pub mod step;
pub mod storage;

// Re-export common types
pub use encoding::{CompressionQuality, ContainerFormat, EncodingConfig, VideoCodec};
pub use mode::ProcessingMode;
pub use rect::{CropRect, FrameMapping, FrameRect, PixelRect};
pub use step::{
    CompressParams, ConvertParams, CropParams, ProcessingStep, StepOperation, StepResolveError,
    StepType, TrimParams, WatermarkParams,
};
pub use storage::{
    DropboxDestination, S3Destination, StorageDestination, StorageProvider, SupabaseDestination,
    UploadConfirmation,
};
