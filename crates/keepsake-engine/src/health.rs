//! Backend health prober
//!
//! Keeps one cached [`HealthState`] per backend. A reading is trusted for `ttl`; an
//! older one is replaced by a fresh probe before it is returned. The per-backend lock
//! is held across the probe, so concurrent callers that find a stale reading wait for
//! the one probe in flight and reuse its result.

use keepsake_core::{BackendKind, HealthState};
use keepsake_storage::Storage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{timeout, Instant};

struct CachedReading {
    state: HealthState,
    probed_at: Instant,
}

struct BackendSlot {
    storage: Arc<dyn Storage>,
    reading: Mutex<Option<CachedReading>>,
}

impl BackendSlot {
    fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            reading: Mutex::new(None),
        }
    }
}

pub struct HealthProber {
    primary: BackendSlot,
    secondary: BackendSlot,
    ttl: Duration,
    probe_timeout: Duration,
}

impl HealthProber {
    pub fn new(
        primary: Arc<dyn Storage>,
        secondary: Arc<dyn Storage>,
        ttl: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            primary: BackendSlot::new(primary),
            secondary: BackendSlot::new(secondary),
            ttl,
            probe_timeout,
        }
    }

    fn slot(&self, backend: BackendKind) -> &BackendSlot {
        match backend {
            BackendKind::Primary => &self.primary,
            BackendKind::Secondary => &self.secondary,
        }
    }

    /// Current health of `backend`, probing only if the cached reading is missing or
    /// older than `ttl`. Never fails: an unreachable backend is an unhealthy reading.
    pub async fn check_health(&self, backend: BackendKind) -> HealthState {
        let slot = self.slot(backend);
        let mut reading = slot.reading.lock().await;

        if let Some(cached) = reading.as_ref() {
            if cached.probed_at.elapsed() < self.ttl {
                return cached.state.clone();
            }
        }

        let state = self.probe(backend, slot.storage.as_ref()).await;
        *reading = Some(CachedReading {
            state: state.clone(),
            probed_at: Instant::now(),
        });
        state
    }

    /// Last cached reading, without probing or waiting.
    ///
    /// `None` when the backend was never probed or a probe is in flight.
    pub fn status(&self, backend: BackendKind) -> Option<HealthState> {
        self.slot(backend)
            .reading
            .try_lock()
            .ok()?
            .as_ref()
            .map(|cached| cached.state.clone())
    }

    /// Record that a real upload just failed against `backend`.
    ///
    /// The backend is treated as unhealthy for one `ttl` window, so following uploads
    /// go straight to the other backend instead of rediscovering the outage.
    pub async fn report_failure(&self, backend: BackendKind, reason: &str) {
        let mut reading = self.slot(backend).reading.lock().await;
        *reading = Some(CachedReading {
            state: HealthState::unhealthy(backend, self.ttl, reason),
            probed_at: Instant::now(),
        });
        tracing::warn!(
            backend = %backend,
            ttl_secs = self.ttl.as_secs(),
            "Backend marked unhealthy after upload failure"
        );
    }

    async fn probe(&self, backend: BackendKind, storage: &dyn Storage) -> HealthState {
        let start = Instant::now();
        let state = match timeout(self.probe_timeout, storage.probe()).await {
            Ok(Ok(())) => HealthState::healthy(backend, self.ttl),
            Ok(Err(e)) => HealthState::unhealthy(backend, self.ttl, e.to_string()),
            Err(_) => HealthState::unhealthy(
                backend,
                self.ttl,
                format!("probe timed out after {}ms", self.probe_timeout.as_millis()),
            ),
        };

        if state.healthy {
            tracing::debug!(
                backend = %backend,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Backend health probe succeeded"
            );
        } else {
            tracing::warn!(
                backend = %backend,
                error = state.error.as_deref().unwrap_or_default(),
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Backend health probe failed"
            );
        }

        state
    }
}
