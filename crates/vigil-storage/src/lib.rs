//! Blob store boundary for the Vigil detection pipeline.
//!
//! Media bytes live in an S3-compatible bucket. The pipeline only needs two
//! things from it: time-limited read handles and existence checks.

pub mod blob;
pub mod client;
pub mod error;

pub use blob::{BlobStore, DEFAULT_ACCESS_HANDLE_TTL, MAX_ACCESS_HANDLE_TTL};
pub use client::{S3BlobStore, S3Config};
pub use error::{StorageError, StorageResult};
