//! Storage collaborators for pipeline delivery.
//!
//! This crate provides:
//! - The [`StorageCollaborator`] seam used by the delivery selector
//! - S3-compatible uploads (AWS S3, Cloudflare R2)
//! - Dropbox and Supabase Storage uploads over their HTTP APIs
//! - A provider router that dispatches on the destination descriptor

pub mod collaborator;
pub mod dropbox;
pub mod error;
pub mod router;
pub mod s3;
pub mod supabase;

pub use collaborator::{object_name, StorageCollaborator, StoredObject};
pub use dropbox::DropboxUploader;
pub use error::{StorageError, StorageResult};
pub use router::StorageRouter;
pub use s3::{S3Config, S3Uploader};
pub use supabase::SupabaseUploader;
