//! Upload failure taxonomy.
//!
//! [`AttemptError`] is what one backend client reports; the router decides on failover
//! from it. [`UploadError`] is what the caller of the orchestrator sees. Neither type's
//! `Display` output carries provider error text to end users: that text is logged and
//! kept only in [`AttemptError`].

use keepsake_core::{BackendKind, ErrorMetadata, LogLevel};
use std::fmt;

/// Generic message shown to end users for every storage failure.
pub const UPLOAD_FAILED_MESSAGE: &str = "Upload failed, please retry";

/// Whether a failure may go away if the same request is repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    Transient,
    Permanent,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Transient => "transient",
            FailureClass::Permanent => "permanent",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a failed [`RetryingClient::upload`](crate::RetryingClient::upload).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptError {
    #[error("{backend} backend: retries exhausted after {attempts} attempts: {message}")]
    TransientExhausted {
        backend: BackendKind,
        attempts: u32,
        message: String,
    },

    /// `backend_wide` is false when only this request was rejected (oversized payload,
    /// malformed request, conflicting key) and the backend is still fit for others.
    #[error("{backend} backend: permanent failure after {attempts} attempt(s): {message}")]
    Permanent {
        backend: BackendKind,
        attempts: u32,
        backend_wide: bool,
        message: String,
    },

    #[error("{backend} backend: deadline reached after {attempts} attempt(s)")]
    DeadlineExceeded { backend: BackendKind, attempts: u32 },
}

impl AttemptError {
    pub fn backend(&self) -> BackendKind {
        match self {
            AttemptError::TransientExhausted { backend, .. }
            | AttemptError::Permanent { backend, .. }
            | AttemptError::DeadlineExceeded { backend, .. } => *backend,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            AttemptError::TransientExhausted { attempts, .. }
            | AttemptError::Permanent { attempts, .. }
            | AttemptError::DeadlineExceeded { attempts, .. } => *attempts,
        }
    }

    /// Failure class for failover decisions; `None` for a deadline, which is not a
    /// statement about the backend.
    pub fn class(&self) -> Option<FailureClass> {
        match self {
            AttemptError::TransientExhausted { .. } => Some(FailureClass::Transient),
            AttemptError::Permanent { .. } => Some(FailureClass::Permanent),
            AttemptError::DeadlineExceeded { .. } => None,
        }
    }

    /// Whether the backend should be treated as unhealthy because of this failure.
    pub fn implicates_backend(&self) -> bool {
        match self {
            AttemptError::TransientExhausted { .. } => true,
            AttemptError::Permanent { backend_wide, .. } => *backend_wide,
            AttemptError::DeadlineExceeded { .. } => false,
        }
    }
}

/// Error returned to callers of the upload orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    /// Retries exhausted on the only backend that was eligible.
    #[error("upload to {backend} backend failed after {attempts} attempts")]
    Transient { backend: BackendKind, attempts: u32 },

    #[error("upload to {backend} backend was rejected")]
    Permanent { backend: BackendKind },

    #[error("upload failed on both backends (primary: {primary}, secondary: {secondary})")]
    FailoverExhausted {
        primary: FailureClass,
        secondary: FailureClass,
    },

    /// Bytes are stored but no record exists; `storage_key` names the orphaned object.
    #[error("photo stored on {backend} backend as {storage_key} but its record could not be written")]
    PersistenceFailed {
        backend: BackendKind,
        storage_key: String,
    },

    #[error("upload deadline exceeded")]
    DeadlineExceeded,

    #[error("invalid batch: {0}")]
    InvalidBatch(String),
}

impl From<AttemptError> for UploadError {
    fn from(err: AttemptError) -> Self {
        match err {
            AttemptError::TransientExhausted {
                backend, attempts, ..
            } => UploadError::Transient { backend, attempts },
            AttemptError::Permanent { backend, .. } => UploadError::Permanent { backend },
            AttemptError::DeadlineExceeded { .. } => UploadError::DeadlineExceeded,
        }
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, log_level).
fn upload_error_static_metadata(
    err: &UploadError,
) -> (u16, &'static str, bool, Option<&'static str>, LogLevel) {
    match err {
        UploadError::Transient { .. } => (
            503,
            "UPLOAD_UNAVAILABLE",
            true,
            Some("Retry after a short delay"),
            LogLevel::Warn,
        ),
        UploadError::Permanent { .. } => (
            502,
            "UPLOAD_REJECTED",
            false,
            Some("Contact support if this error persists"),
            LogLevel::Error,
        ),
        UploadError::FailoverExhausted { .. } => (
            503,
            "STORAGE_UNAVAILABLE",
            true,
            Some("Retry after a short delay"),
            LogLevel::Error,
        ),
        UploadError::PersistenceFailed { .. } => (
            500,
            "PERSISTENCE_FAILED",
            true,
            Some("Retry after a short delay"),
            LogLevel::Error,
        ),
        UploadError::DeadlineExceeded => (
            504,
            "UPLOAD_TIMEOUT",
            true,
            Some("Retry with a smaller file or a longer deadline"),
            LogLevel::Warn,
        ),
        UploadError::InvalidBatch(_) => (
            400,
            "INVALID_BATCH",
            false,
            Some("Check request parameters and try again"),
            LogLevel::Debug,
        ),
    }
}

impl ErrorMetadata for UploadError {
    fn http_status_code(&self) -> u16 {
        upload_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        upload_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        upload_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        upload_error_static_metadata(self).3
    }

    fn client_message(&self) -> String {
        match self {
            UploadError::InvalidBatch(reason) => reason.clone(),
            _ => UPLOAD_FAILED_MESSAGE.to_string(),
        }
    }

    fn is_sensitive(&self) -> bool {
        !matches!(self, UploadError::InvalidBatch(_))
    }

    fn log_level(&self) -> LogLevel {
        upload_error_static_metadata(self).4
    }
}
