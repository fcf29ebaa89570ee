//! Keepsake Core Library
//!
//! This crate provides the domain models, error types, configuration and the CDN URL
//! rule shared by every Keepsake component.

pub mod cdn;
pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use cdn::{CdnRewriter, CdnUrlRewriter};
pub use config::{BackendConfig, Config, EngineTuning};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{HealthState, NewPhoto, Photo};
pub use storage_types::{BackendKind, StorageBackend};
