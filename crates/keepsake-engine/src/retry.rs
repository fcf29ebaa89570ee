//! Bounded retry against a single backend.

use async_trait::async_trait;
use bytes::Bytes;
use keepsake_core::{BackendKind, EngineTuning};
use keepsake_storage::{Storage, StorageError};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::AttemptError;

/// Exponential backoff with equal jitter.
///
/// The ceiling for retry `n` (zero-based) is `base * multiplier^n`, clamped to `max`.
/// With jitter the actual delay is drawn uniformly from `[ceiling / 2, ceiling]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_tuning(tuning: &EngineTuning) -> Self {
        Self {
            max_attempts: tuning.max_attempts.max(1),
            base: tuning.backoff_base,
            max: tuning.backoff_max,
            ..Self::default()
        }
    }

    pub fn ceiling_for(&self, retry: u32) -> Duration {
        // retry counts are single digits; the cast cannot wrap
        #[allow(clippy::cast_possible_wrap)]
        let raw = self.base.as_secs_f64() * self.multiplier.powi(retry as i32);
        Duration::from_secs_f64(raw.min(self.max.as_secs_f64()))
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        let ceiling = self.ceiling_for(retry);
        if !self.jitter {
            return ceiling;
        }
        let half = ceiling / 2;
        let spread = u64::try_from((ceiling - half).as_nanos()).unwrap_or(u64::MAX);
        half + Duration::from_nanos(rand::rng().random_range(0..=spread))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_millis(200),
            max: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Waits between attempts. Injected so tests can observe or skip backoff.
#[async_trait]
pub trait Delay: Send + Sync {
    async fn delay(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn delay(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Bytes confirmed written to one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub backend: BackendKind,
    pub storage_key: String,
    /// Direct URL reported by the backend.
    pub url: String,
    pub attempts: u32,
}

/// Uploads to exactly one backend, retrying transient failures.
#[derive(Clone)]
pub struct RetryingClient {
    kind: BackendKind,
    storage: Arc<dyn Storage>,
    policy: RetryPolicy,
    delay: Arc<dyn Delay>,
}

impl RetryingClient {
    pub fn new(kind: BackendKind, storage: Arc<dyn Storage>, policy: RetryPolicy) -> Self {
        Self {
            kind,
            storage,
            policy,
            delay: Arc::new(TokioDelay),
        }
    }

    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    /// Write `data` under `storage_key`, making at most `max_attempts` attempts.
    ///
    /// Every attempt sends the same payload to the same key. If the key already holds
    /// an object of the same length (an earlier attempt landed but its response was
    /// lost) the upload counts as done; a different length is a permanent failure.
    /// No backoff sleep is started that would end past `deadline`.
    pub async fn upload(
        &self,
        storage_key: &str,
        data: Bytes,
        content_type: &str,
        deadline: Option<Instant>,
    ) -> Result<StoredObject, AttemptError> {
        let expected_len = data.len() as u64;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let start = Instant::now();

            let result = match self.storage.put(storage_key, data.clone(), content_type).await {
                Err(StorageError::AlreadyExists(_)) => {
                    self.confirm_existing(storage_key, expected_len).await
                }
                other => other,
            };

            let err = match result {
                Ok(url) => {
                    tracing::info!(
                        backend = %self.kind,
                        key = %storage_key,
                        size_bytes = expected_len,
                        attempt,
                        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "Upload attempt succeeded"
                    );
                    return Ok(StoredObject {
                        backend: self.kind,
                        storage_key: storage_key.to_string(),
                        url,
                        attempts: attempt,
                    });
                }
                Err(err) => err,
            };

            if !err.is_transient() {
                tracing::error!(
                    backend = %self.kind,
                    key = %storage_key,
                    attempt,
                    error = %err,
                    "Upload attempt failed permanently"
                );
                return Err(AttemptError::Permanent {
                    backend: self.kind,
                    attempts: attempt,
                    backend_wide: err.is_backend_wide(),
                    message: err.to_string(),
                });
            }

            if attempt >= self.policy.max_attempts {
                tracing::warn!(
                    backend = %self.kind,
                    key = %storage_key,
                    attempt,
                    error = %err,
                    "Upload retries exhausted"
                );
                return Err(AttemptError::TransientExhausted {
                    backend: self.kind,
                    attempts: attempt,
                    message: err.to_string(),
                });
            }

            let wait = self.policy.delay_for(attempt - 1);
            if let Some(deadline) = deadline {
                if Instant::now() + wait >= deadline {
                    tracing::warn!(
                        backend = %self.kind,
                        key = %storage_key,
                        attempt,
                        "Deadline reached before next retry"
                    );
                    return Err(AttemptError::DeadlineExceeded {
                        backend: self.kind,
                        attempts: attempt,
                    });
                }
            }

            tracing::warn!(
                backend = %self.kind,
                key = %storage_key,
                attempt,
                retry_in_ms = wait.as_millis() as u64,
                error = %err,
                "Transient upload failure, retrying"
            );
            self.delay.delay(wait).await;
        }
    }

    async fn confirm_existing(
        &self,
        storage_key: &str,
        expected_len: u64,
    ) -> Result<String, StorageError> {
        let stored_len = self.storage.content_length(storage_key).await?;
        if stored_len == expected_len {
            tracing::info!(
                backend = %self.kind,
                key = %storage_key,
                "Object already present with matching size"
            );
            Ok(self.storage.object_url(storage_key))
        } else {
            Err(StorageError::AlreadyExists(format!(
                "{} holds {} bytes, expected {}",
                storage_key, stored_len, expected_len
            )))
        }
    }
}
