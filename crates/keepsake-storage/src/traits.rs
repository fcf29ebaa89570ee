//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement, and
//! the error type whose variants carry the transient/permanent classification the
//! retrying client relies on.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use thiserror::Error;

/// Storage operation errors
///
/// Each variant belongs to exactly one failure class; see [`StorageError::is_transient`].
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// Whether the same request may succeed if simply repeated.
    ///
    /// Timeouts, dropped connections, rate limiting and 5xx-class responses are
    /// transient. Auth failures, oversized payloads, malformed requests, exhausted quota
    /// and configuration problems are permanent. `AlreadyExists` and `NotFound` are
    /// answers rather than failures and are never retried.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Timeout(_)
            | StorageError::Connection(_)
            | StorageError::RateLimited(_)
            | StorageError::Unavailable(_) => true,
            StorageError::IoError(e) => matches!(
                e.kind(),
                ErrorKind::TimedOut
                    | ErrorKind::Interrupted
                    | ErrorKind::WouldBlock
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
            ),
            StorageError::Unauthorized(_)
            | StorageError::PayloadTooLarge(_)
            | StorageError::InvalidRequest(_)
            | StorageError::QuotaExhausted(_)
            | StorageError::AlreadyExists(_)
            | StorageError::NotFound(_)
            | StorageError::InvalidKey(_)
            | StorageError::ConfigError(_) => false,
        }
    }

    /// Whether the failure says something about the backend itself rather than about
    /// the request that hit it.
    ///
    /// Transient failures, rejected credentials, exhausted quota, misconfiguration and
    /// non-transient IO errors apply to every request. Oversized payloads, malformed
    /// requests, bad keys and conflicts on an existing key only concern the request.
    pub fn is_backend_wide(&self) -> bool {
        match self {
            StorageError::Unauthorized(_)
            | StorageError::QuotaExhausted(_)
            | StorageError::ConfigError(_)
            | StorageError::IoError(_) => true,
            StorageError::PayloadTooLarge(_)
            | StorageError::InvalidRequest(_)
            | StorageError::AlreadyExists(_)
            | StorageError::NotFound(_)
            | StorageError::InvalidKey(_) => false,
            other => other.is_transient(),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage abstraction trait
///
/// All storage backends (S3-compatible, local filesystem) implement this trait so the
/// failover engine can treat primary and secondary uniformly.
///
/// Implementations perform exactly one request per call. Retrying is the caller's job;
/// an implementation that retried internally would break the engine's attempt bound.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write `data` under `storage_key` and return the object's direct URL.
    ///
    /// Writing the same bytes to the same key twice must be safe. Backends that can
    /// detect an existing object report [`StorageError::AlreadyExists`] instead of
    /// overwriting it.
    async fn put(&self, storage_key: &str, data: Bytes, content_type: &str)
        -> StorageResult<String>;

    /// Size in bytes of a stored object.
    async fn content_length(&self, storage_key: &str) -> StorageResult<u64>;

    /// Check if an object exists
    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        match self.content_length(storage_key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    /// Minimal reachability check: one cheap request with no side effects.
    async fn probe(&self) -> StorageResult<()>;

    /// Direct URL of an object in this backend. Pure and deterministic.
    fn object_url(&self, storage_key: &str) -> String;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
