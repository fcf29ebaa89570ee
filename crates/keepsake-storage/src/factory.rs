#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::{S3Settings, S3Storage};
use crate::{Storage, StorageBackend, StorageError, StorageResult};
use keepsake_core::{BackendConfig, EngineTuning};
use std::sync::Arc;

#[cfg(feature = "storage-s3")]
const DEFAULT_REGION: &str = "us-east-1";

/// Create a storage backend from one backend's configuration block
pub async fn create_storage(
    config: &BackendConfig,
    tuning: &EngineTuning,
) -> StorageResult<Arc<dyn Storage>> {
    match config.backend() {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let bucket = config
                .bucket
                .clone()
                .ok_or_else(|| StorageError::ConfigError("S3 bucket not configured".to_string()))?;

            let storage = S3Storage::new(S3Settings {
                bucket,
                region: config
                    .region
                    .clone()
                    .unwrap_or_else(|| DEFAULT_REGION.to_string()),
                endpoint_url: config.endpoint.clone(),
                access_key_id: config.access_key_id.clone(),
                secret_access_key: config.secret_access_key.clone(),
                public_base_url: config.public_base_url.clone(),
                request_timeout: tuning.attempt_timeout,
            })?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => {
            let _ = tuning;
            Err(StorageError::ConfigError(
                "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
            ))
        }

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config.local_path.clone().ok_or_else(|| {
                StorageError::ConfigError("Local storage path not configured".to_string())
            })?;
            let base_url = config.local_base_url.clone().ok_or_else(|| {
                StorageError::ConfigError("Local storage base URL not configured".to_string())
            })?;

            let storage = LocalStorage::new(base_path, base_url).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_local_backend() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = BackendConfig {
            backend: Some(StorageBackend::Local),
            local_path: Some(dir.path().to_string_lossy().into_owned()),
            local_base_url: Some("http://localhost:3000/photos".to_string()),
            ..Default::default()
        };

        let storage = create_storage(&config, &EngineTuning::default())
            .await
            .unwrap();
        assert_eq!(storage.backend_type(), StorageBackend::Local);
        assert_eq!(
            storage.object_url("photos/1-a.jpg"),
            "http://localhost:3000/photos/photos/1-a.jpg"
        );
    }

    #[tokio::test]
    async fn local_backend_without_path_is_config_error() {
        let config = BackendConfig {
            backend: Some(StorageBackend::Local),
            ..Default::default()
        };
        let err = create_storage(&config, &EngineTuning::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StorageError::ConfigError(_)));
    }

    #[cfg(feature = "storage-s3")]
    #[tokio::test]
    async fn s3_backend_without_bucket_is_config_error() {
        let config = BackendConfig::default();
        let err = create_storage(&config, &EngineTuning::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StorageError::ConfigError(_)));
    }
}
