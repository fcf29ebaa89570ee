use keepsake_core::BackendKind;
use std::sync::Arc;

use crate::error::AttemptError;
use crate::health::HealthProber;

/// Chooses the backend for each upload and decides whether a failure may fail over.
#[derive(Clone)]
pub struct StorageRouter {
    prober: Arc<HealthProber>,
}

impl StorageRouter {
    /// Failover hops allowed per upload.
    pub const MAX_HOPS: u32 = 1;

    pub fn new(prober: Arc<HealthProber>) -> Self {
        Self { prober }
    }

    /// Primary when its health reading is good, otherwise secondary without touching
    /// the primary at all.
    pub async fn select_backend(&self) -> BackendKind {
        let health = self.prober.check_health(BackendKind::Primary).await;
        if health.healthy {
            BackendKind::Primary
        } else {
            tracing::warn!(
                error = health.error.as_deref().unwrap_or_default(),
                "Primary backend unhealthy, routing upload to secondary"
            );
            BackendKind::Secondary
        }
    }

    /// Only a primary failure, with no hop taken yet, may move to the secondary.
    /// Deadline errors never fail over.
    pub fn should_failover(&self, from: BackendKind, error: &AttemptError, hops: u32) -> bool {
        from == BackendKind::Primary
            && hops < Self::MAX_HOPS
            && matches!(
                error,
                AttemptError::TransientExhausted { .. } | AttemptError::Permanent { .. }
            )
    }
}
