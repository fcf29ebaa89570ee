//! Backend health reading.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::storage_types::BackendKind;

/// Result of one health probe. Ephemeral; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthState {
    pub backend: BackendKind,
    pub healthy: bool,
    pub checked_at: DateTime<Utc>,
    /// How long this reading may be trusted before it must be re-probed.
    pub ttl: Duration,
    /// Probe failure text, for logs and status output only.
    pub error: Option<String>,
}

impl HealthState {
    pub fn healthy(backend: BackendKind, ttl: Duration) -> Self {
        Self {
            backend,
            healthy: true,
            checked_at: Utc::now(),
            ttl,
            error: None,
        }
    }

    pub fn unhealthy(backend: BackendKind, ttl: Duration, error: impl Into<String>) -> Self {
        Self {
            backend,
            healthy: false,
            checked_at: Utc::now(),
            ttl,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unhealthy_reading_keeps_error_text() {
        let state = HealthState::unhealthy(
            BackendKind::Primary,
            Duration::from_secs(30),
            "Access denied",
        );
        assert!(!state.healthy);
        assert_eq!(state.error.as_deref(), Some("Access denied"));
        assert_eq!(state.ttl, Duration::from_secs(30));
    }

    #[test]
    fn healthy_reading_has_no_error() {
        let state = HealthState::healthy(BackendKind::Secondary, Duration::from_secs(5));
        assert!(state.healthy);
        assert!(state.error.is_none());
        assert_eq!(state.backend, BackendKind::Secondary);
    }
}
