//! Upload orchestrator: the engine's entry point.
//!
//! ```text
//! START -> SELECT_BACKEND -> ATTEMPT_UPLOAD -> {SUCCESS, NEEDS_FAILOVER, FAILED}
//! NEEDS_FAILOVER -> ATTEMPT_UPLOAD (secondary) -> {SUCCESS, FAILED}
//! SUCCESS -> PERSIST_RECORD -> DONE
//! ```
//!
//! A caller deadline bounds everything up to persistence. Once the record insert has
//! started it runs to completion, so a returned error never leaves a record behind.

use bytes::Bytes;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use keepsake_core::{AppError, BackendKind, CdnRewriter, EngineTuning, Photo};
use keepsake_db::PhotoRepository;
use keepsake_storage::{generate_photo_key, Storage};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{AttemptError, FailureClass, UploadError};
use crate::health::HealthProber;
use crate::persister::{PublicUrlRule, StorageRecordPersister};
use crate::retry::{Delay, RetryPolicy, RetryingClient, StoredObject};
use crate::router::StorageRouter;

/// One upload as handed over by the transport layer, already validated.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub data: Bytes,
    pub content_type: String,
    /// Original file name; sanitised into the storage key when present.
    pub file_name: Option<String>,
    /// Overrides the configured default deadline.
    pub deadline: Option<Duration>,
}

impl UploadRequest {
    pub fn new(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.into(),
            file_name: None,
            deadline: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Per-item results of a batch, in request order.
#[derive(Debug)]
pub struct BatchOutcome {
    pub results: Vec<Result<Photo, UploadError>>,
}

impl BatchOutcome {
    pub fn photos(&self) -> impl Iterator<Item = &Photo> {
        self.results.iter().filter_map(|r| r.as_ref().ok())
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.results.len() - self.success_count()
    }
}

pub struct UploadOrchestrator {
    prober: Arc<HealthProber>,
    router: StorageRouter,
    primary: RetryingClient,
    secondary: RetryingClient,
    persister: StorageRecordPersister,
    default_deadline: Option<Duration>,
    batch_max: usize,
    batch_concurrency: usize,
}

impl UploadOrchestrator {
    pub fn new(
        primary: Arc<dyn Storage>,
        secondary: Arc<dyn Storage>,
        repo: Arc<dyn PhotoRepository>,
        cdn: Arc<dyn CdnRewriter>,
        tuning: &EngineTuning,
    ) -> Self {
        let prober = Arc::new(HealthProber::new(
            primary.clone(),
            secondary.clone(),
            tuning.health_ttl,
            tuning.probe_timeout,
        ));
        let policy = RetryPolicy::from_tuning(tuning);
        let rule = PublicUrlRule::new(cdn, secondary.clone());

        Self {
            router: StorageRouter::new(prober.clone()),
            prober,
            primary: RetryingClient::new(BackendKind::Primary, primary, policy.clone()),
            secondary: RetryingClient::new(BackendKind::Secondary, secondary, policy),
            persister: StorageRecordPersister::new(repo, rule),
            default_deadline: tuning.default_deadline,
            batch_max: tuning.batch_max.max(1),
            batch_concurrency: tuning.batch_concurrency.max(1),
        }
    }

    /// Replace the backoff delay of both backend clients.
    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.primary = self.primary.with_delay(delay.clone());
        self.secondary = self.secondary.with_delay(delay);
        self
    }

    pub fn prober(&self) -> &Arc<HealthProber> {
        &self.prober
    }

    fn client(&self, backend: BackendKind) -> &RetryingClient {
        match backend {
            BackendKind::Primary => &self.primary,
            BackendKind::Secondary => &self.secondary,
        }
    }

    pub async fn store_upload(
        &self,
        data: Bytes,
        content_type: &str,
        deadline: Option<Duration>,
    ) -> Result<Photo, UploadError> {
        let mut request = UploadRequest::new(data, content_type);
        request.deadline = deadline;
        self.store(request).await
    }

    /// Store one upload and return its record.
    pub async fn store(&self, request: UploadRequest) -> Result<Photo, UploadError> {
        let UploadRequest {
            data,
            content_type,
            file_name,
            deadline,
        } = request;

        let deadline = deadline
            .or(self.default_deadline)
            .map(|budget| Instant::now() + budget);
        let storage_key = generate_photo_key(file_name.as_deref(), &content_type, Utc::now());
        let size_bytes = data.len() as u64;

        let transfer = self.transfer(&storage_key, data, &content_type, deadline);
        let stored = match deadline {
            Some(at) => match tokio::time::timeout_at(at, transfer).await {
                Ok(result) => result?,
                Err(_) => {
                    tracing::warn!(key = %storage_key, "Upload deadline exceeded during transfer");
                    return Err(UploadError::DeadlineExceeded);
                }
            },
            None => transfer.await?,
        };

        if let Some(at) = deadline {
            if Instant::now() >= at {
                tracing::warn!(
                    backend = %stored.backend,
                    key = %stored.storage_key,
                    "Upload deadline exceeded before persistence; object left orphaned"
                );
                return Err(UploadError::DeadlineExceeded);
            }
        }

        self.persist(stored, size_bytes, &content_type).await
    }

    /// Store up to `batch_max` uploads with bounded concurrency.
    ///
    /// Each item succeeds or fails on its own; only an empty or oversized batch is
    /// rejected as a whole.
    pub async fn store_batch(
        &self,
        requests: Vec<UploadRequest>,
    ) -> Result<BatchOutcome, UploadError> {
        if requests.is_empty() {
            return Err(UploadError::InvalidBatch("No files provided".to_string()));
        }
        if requests.len() > self.batch_max {
            return Err(UploadError::InvalidBatch(format!(
                "Maximum {} files per batch",
                self.batch_max
            )));
        }

        let total = requests.len();
        let results: Vec<_> = stream::iter(requests.into_iter().map(|r| self.store(r)))
            .buffered(self.batch_concurrency)
            .collect()
            .await;
        let outcome = BatchOutcome { results };

        if outcome.failure_count() > 0 {
            tracing::warn!(
                total,
                failed = outcome.failure_count(),
                "Batch upload completed with failures"
            );
        } else {
            tracing::info!(total, "Batch upload completed");
        }

        Ok(outcome)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Photo>, AppError> {
        self.persister.get(id).await
    }

    /// Select, attempt, and fail over at most once.
    async fn transfer(
        &self,
        storage_key: &str,
        data: Bytes,
        content_type: &str,
        deadline: Option<Instant>,
    ) -> Result<StoredObject, UploadError> {
        let selected = self.router.select_backend().await;

        let first_error = match self
            .client(selected)
            .upload(storage_key, data.clone(), content_type, deadline)
            .await
        {
            Ok(stored) => return Ok(stored),
            Err(err) => err,
        };

        if !self.router.should_failover(selected, &first_error, 0) {
            return Err(first_error.into());
        }

        let primary_class = match first_error.class() {
            Some(class) => class,
            None => return Err(UploadError::DeadlineExceeded),
        };

        if first_error.implicates_backend() {
            self.prober
                .report_failure(selected, &first_error.to_string())
                .await;
        }
        tracing::warn!(
            key = %storage_key,
            from = %selected,
            failure_class = %primary_class,
            attempts = first_error.attempts(),
            "Failing over to secondary backend"
        );

        match self
            .secondary
            .upload(storage_key, data, content_type, deadline)
            .await
        {
            Ok(stored) => Ok(stored),
            Err(AttemptError::DeadlineExceeded { .. }) => Err(UploadError::DeadlineExceeded),
            Err(second_error) => {
                let secondary_class = second_error.class().unwrap_or(FailureClass::Transient);
                tracing::error!(
                    key = %storage_key,
                    primary_error = %first_error,
                    secondary_error = %second_error,
                    "Upload failed on both backends"
                );
                Err(UploadError::FailoverExhausted {
                    primary: primary_class,
                    secondary: secondary_class,
                })
            }
        }
    }

    async fn persist(
        &self,
        stored: StoredObject,
        size_bytes: u64,
        content_type: &str,
    ) -> Result<Photo, UploadError> {
        match self
            .persister
            .record_photo(
                stored.backend,
                &stored.storage_key,
                &stored.url,
                size_bytes,
                content_type,
            )
            .await
        {
            Ok(photo) => Ok(photo),
            Err(e) => {
                tracing::error!(
                    error = %e.detailed_message(),
                    backend = %stored.backend,
                    key = %stored.storage_key,
                    "Photo record could not be written; stored object is orphaned"
                );
                Err(UploadError::PersistenceFailed {
                    backend: stored.backend,
                    storage_key: stored.storage_key,
                })
            }
        }
    }
}
