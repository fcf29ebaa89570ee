use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, Attributes, ClientOptions, ObjectStore, ObjectStoreExt, PutOptions, PutPayload,
    Result as ObjectResult, RetryConfig,
};
use std::time::Duration;

/// Objects are immutable once written, so caches may keep them for a year.
const CACHE_CONTROL: &str = "public, max-age=31536000";

/// Key used by the reachability probe. It normally does not exist; a 404 still proves
/// the endpoint, credentials and bucket all work.
const PROBE_KEY: &str = "health/probe";

/// Connection settings for an S3-compatible bucket.
#[derive(Clone, Debug)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible providers
    /// (e.g., "https://s3.us-west-002.backblazeb2.com" for B2, "http://localhost:9000" for MinIO)
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Overrides the base of direct object URLs.
    pub public_base_url: Option<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

/// S3 storage implementation
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
    public_base_url: Option<String>,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// The underlying client is configured with zero internal retries: each `put` is
    /// exactly one HTTP request and the failover engine owns the retry budget.
    pub fn new(settings: S3Settings) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_region(settings.region.clone())
            .with_bucket_name(settings.bucket.clone())
            .with_retry(RetryConfig {
                max_retries: 0,
                ..Default::default()
            })
            .with_client_options(ClientOptions::new().with_timeout(settings.request_timeout));

        if let (Some(key_id), Some(secret)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            builder = builder
                .with_access_key_id(key_id.clone())
                .with_secret_access_key(secret.clone());
        }

        if let Some(ref endpoint) = settings.endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage {
            store,
            bucket: settings.bucket,
            region: settings.region,
            endpoint_url: settings.endpoint_url,
            public_base_url: settings.public_base_url,
        })
    }

    /// Generate public URL for S3 object
    ///
    /// Uses `public_base_url` when configured, path-style `{endpoint}/{bucket}/{key}` for
    /// S3-compatible providers, and the virtual-hosted AWS form otherwise.
    fn generate_url(&self, key: &str) -> String {
        if let Some(ref base) = self.public_base_url {
            format!("{}/{}", base.trim_end_matches('/'), key)
        } else if let Some(ref endpoint) = self.endpoint_url {
            let base_url = endpoint.trim_end_matches('/');
            format!("{}/{}/{}", base_url, self.bucket, key)
        } else {
            format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            )
        }
    }
}

/// Map an object_store error onto the transient/permanent taxonomy.
fn map_object_store_error(err: ObjectStoreError, key: &str) -> StorageError {
    match err {
        ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
        ObjectStoreError::AlreadyExists { .. } | ObjectStoreError::Precondition { .. } => {
            StorageError::AlreadyExists(key.to_string())
        }
        ObjectStoreError::PermissionDenied { .. } | ObjectStoreError::Unauthenticated { .. } => {
            classify_failure_message(&err.to_string(), StorageError::Unauthorized)
        }
        ObjectStoreError::InvalidPath { .. } => StorageError::InvalidKey(err.to_string()),
        other => classify_failure_message(&other.to_string(), StorageError::Unavailable),
    }
}

/// Classify an HTTP-level failure from its rendered message.
///
/// object_store folds status codes and transport errors into `Generic`, so the status
/// text is the only signal left. Quota is checked first because B2 reports an exceeded
/// cap as a 403.
fn classify_failure_message(
    message: &str,
    fallback: fn(String) -> StorageError,
) -> StorageError {
    let lower = message.to_lowercase();
    let owned = message.to_string();

    if lower.contains("quota") || lower.contains("cap exceeded") {
        StorageError::QuotaExhausted(owned)
    } else if lower.contains("413") || lower.contains("too large") {
        StorageError::PayloadTooLarge(owned)
    } else if lower.contains("429") || lower.contains("too many requests") || lower.contains("slowdown") {
        StorageError::RateLimited(owned)
    } else if lower.contains("timed out") || lower.contains("timeout") {
        StorageError::Timeout(owned)
    } else if lower.contains("401") || lower.contains("403") || lower.contains("unauthorized") || lower.contains("forbidden") || lower.contains("access denied") {
        StorageError::Unauthorized(owned)
    } else if lower.contains("400") || lower.contains("bad request") || lower.contains("malformed") {
        StorageError::InvalidRequest(owned)
    } else if lower.contains("connect") || lower.contains("connection") || lower.contains("reset") || lower.contains("broken pipe") || lower.contains("dns") {
        StorageError::Connection(owned)
    } else {
        fallback(owned)
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn put(
        &self,
        storage_key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<String> {
        let size = data.len() as u64;
        let location = Path::from(storage_key.to_string());
        let start = std::time::Instant::now();

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        attributes.insert(Attribute::CacheControl, CACHE_CONTROL.into());
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        let result: ObjectResult<_> = self
            .store
            .put_opts(&location, PutPayload::from(data), opts)
            .await;

        result.map_err(|e| {
            let mapped = map_object_store_error(e, storage_key);
            tracing::error!(
                error = %mapped,
                transient = mapped.is_transient(),
                bucket = %self.bucket,
                key = %storage_key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            mapped
        })?;

        let url = self.generate_url(storage_key);

        tracing::info!(
            bucket = %self.bucket,
            key = %storage_key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(url)
    }

    async fn content_length(&self, storage_key: &str) -> StorageResult<u64> {
        let location = Path::from(storage_key.to_string());
        let meta = self
            .store
            .head(&location)
            .await
            .map_err(|e| map_object_store_error(e, storage_key))?;
        Ok(meta.size as u64)
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        let location = Path::from(storage_key.to_string());
        match self.store.delete(&location).await {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {
                tracing::info!(bucket = %self.bucket, key = %storage_key, "S3 object deleted");
                Ok(())
            }
            Err(e) => Err(map_object_store_error(e, storage_key)),
        }
    }

    async fn probe(&self) -> StorageResult<()> {
        let location = Path::from(PROBE_KEY);
        match self.store.head(&location).await {
            Ok(_) | Err(ObjectStoreError::NotFound { .. }) => Ok(()),
            Err(e) => Err(map_object_store_error(e, PROBE_KEY)),
        }
    }

    fn object_url(&self, storage_key: &str) -> String {
        self.generate_url(storage_key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
