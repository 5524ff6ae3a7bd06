//! Blob store clients for uploads and processed artifacts.
//!
//! This crate provides:
//! - The `BlobStore` trait consumed by the pipeline
//! - An S3-compatible client (AWS S3, R2, MinIO)
//! - A local filesystem store for development and tests
//! - Deterministic keys for processed artifacts

pub mod client;
pub mod error;
pub mod keys;
pub mod local;
pub mod store;

pub use client::{S3BlobStore, S3Config};
pub use error::{StorageError, StorageResult};
pub use keys::{processed_video_key, thumbnail_key, Buckets};
pub use local::LocalBlobStore;
pub use store::BlobStore;
