//! Keepsake Storage Library
//!
//! This crate provides the object-store abstraction the failover engine writes photo
//! bytes through, with an S3-compatible implementation (Backblaze B2, MinIO, AWS) and a
//! local filesystem implementation.
//!
//! # Storage key format
//!
//! Every backend stores photos under the same key layout:
//!
//! - `photos/{unix_millis}-{uuid}.{ext}` when no original file name is known
//! - `photos/{unix_millis}-{uuid}-{sanitized_name}` otherwise
//!
//! Keys never contain `..` or a leading `/`. Key generation lives in the `keys` module so
//! the key chosen for a primary attempt is reused verbatim for the secondary.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use keepsake_core::StorageBackend;
pub use keys::generate_photo_key;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::{S3Settings, S3Storage};
pub use traits::{Storage, StorageError, StorageResult};
