//! Configuration module
//!
//! Environment-driven configuration for both storage backends, the CDN rule, the
//! database and the failover engine's tuning parameters.

use std::env;
use std::time::Duration;

use crate::storage_types::StorageBackend;

const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const HEALTH_TTL_SECS: u64 = 30;
const HEALTH_PROBE_TIMEOUT_MS: u64 = 2_000;
const UPLOAD_MAX_ATTEMPTS: u32 = 3;
const UPLOAD_BACKOFF_BASE_MS: u64 = 200;
const UPLOAD_BACKOFF_MAX_MS: u64 = 2_000;
const UPLOAD_ATTEMPT_TIMEOUT_SECS: u64 = 30;
const BATCH_MAX_UPLOADS: usize = 50;
const BATCH_CONCURRENCY: usize = 4;

/// Connection settings for one object store.
#[derive(Clone, Debug, Default)]
pub struct BackendConfig {
    pub backend: Option<StorageBackend>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible providers (Backblaze B2, MinIO, ...)
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Base for direct object URLs; defaults to `{endpoint}/{bucket}` for S3.
    pub public_base_url: Option<String>,
    pub local_path: Option<String>,
    pub local_base_url: Option<String>,
}

impl BackendConfig {
    pub fn backend(&self) -> StorageBackend {
        self.backend.unwrap_or(StorageBackend::S3)
    }

    fn from_lookup(
        prefix: &str,
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<Self, anyhow::Error> {
        let var = |name: &str| {
            lookup(&format!("{}_{}", prefix, name))
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let backend = var("STORAGE_BACKEND")
            .map(|s| {
                s.parse::<StorageBackend>()
                    .map_err(|e| anyhow::anyhow!("{}_STORAGE_BACKEND: {}", prefix, e))
            })
            .transpose()?;

        Ok(Self {
            backend,
            bucket: var("S3_BUCKET"),
            region: var("S3_REGION"),
            endpoint: var("S3_ENDPOINT"),
            access_key_id: var("ACCESS_KEY_ID"),
            secret_access_key: var("SECRET_ACCESS_KEY"),
            public_base_url: var("PUBLIC_BASE_URL"),
            local_path: var("LOCAL_PATH"),
            local_base_url: var("LOCAL_BASE_URL"),
        })
    }

    fn validate(&self, role: &str) -> Result<(), anyhow::Error> {
        match self.backend() {
            StorageBackend::S3 => {
                let missing = [
                    ("S3_ENDPOINT", &self.endpoint),
                    ("S3_BUCKET", &self.bucket),
                    ("ACCESS_KEY_ID", &self.access_key_id),
                    ("SECRET_ACCESS_KEY", &self.secret_access_key),
                ]
                .iter()
                .filter(|(_, value)| value.is_none())
                .map(|(name, _)| format!("{}_{}", role.to_uppercase(), name))
                .collect::<Vec<_>>();

                if !missing.is_empty() {
                    return Err(anyhow::anyhow!(
                        "Missing required {} backend configuration: {}",
                        role,
                        missing.join(", ")
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_path.is_none() || self.local_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "Missing required {} backend configuration: {}_LOCAL_PATH and {}_LOCAL_BASE_URL must be set",
                        role,
                        role.to_uppercase(),
                        role.to_uppercase()
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Failover engine parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineTuning {
    /// How long a health reading is trusted before re-probing.
    pub health_ttl: Duration,
    pub probe_timeout: Duration,
    /// Attempts per backend, including the first.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Per-request timeout handed to the object store client.
    pub attempt_timeout: Duration,
    /// Deadline applied when the caller supplies none. `None` means unbounded.
    pub default_deadline: Option<Duration>,
    pub batch_max: usize,
    pub batch_concurrency: usize,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            health_ttl: Duration::from_secs(HEALTH_TTL_SECS),
            probe_timeout: Duration::from_millis(HEALTH_PROBE_TIMEOUT_MS),
            max_attempts: UPLOAD_MAX_ATTEMPTS,
            backoff_base: Duration::from_millis(UPLOAD_BACKOFF_BASE_MS),
            backoff_max: Duration::from_millis(UPLOAD_BACKOFF_MAX_MS),
            attempt_timeout: Duration::from_secs(UPLOAD_ATTEMPT_TIMEOUT_SECS),
            default_deadline: None,
            batch_max: BATCH_MAX_UPLOADS,
            batch_concurrency: BATCH_CONCURRENCY,
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub primary: BackendConfig,
    pub secondary: BackendConfig,
    /// Domain of the CDN fronting the primary bucket.
    pub cdn_domain: String,
    pub tuning: EngineTuning,
    /// `pretty` or `json`
    pub log_format: String,
}

impl Config {
    /// Load configuration from the process environment (and `.env` if present).
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, anyhow::Error> {
        let parse_u64 = |name: &str, default: u64| {
            lookup(name)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };

        let environment = lookup("ENVIRONMENT")
            .or_else(|| lookup("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let mut primary = BackendConfig::from_lookup("PRIMARY", &lookup)?;
        // The primary is always S3-compatible; only the secondary may be local.
        primary.backend = Some(StorageBackend::S3);
        let secondary = BackendConfig::from_lookup("SECONDARY", &lookup)?;

        let tuning = EngineTuning {
            health_ttl: Duration::from_secs(parse_u64("HEALTH_TTL_SECS", HEALTH_TTL_SECS)),
            probe_timeout: Duration::from_millis(parse_u64(
                "HEALTH_PROBE_TIMEOUT_MS",
                HEALTH_PROBE_TIMEOUT_MS,
            )),
            max_attempts: lookup("UPLOAD_MAX_ATTEMPTS")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(UPLOAD_MAX_ATTEMPTS),
            backoff_base: Duration::from_millis(parse_u64(
                "UPLOAD_BACKOFF_BASE_MS",
                UPLOAD_BACKOFF_BASE_MS,
            )),
            backoff_max: Duration::from_millis(parse_u64(
                "UPLOAD_BACKOFF_MAX_MS",
                UPLOAD_BACKOFF_MAX_MS,
            )),
            attempt_timeout: Duration::from_secs(parse_u64(
                "UPLOAD_ATTEMPT_TIMEOUT_SECS",
                UPLOAD_ATTEMPT_TIMEOUT_SECS,
            )),
            default_deadline: lookup("UPLOAD_DEFAULT_DEADLINE_MS")
                .and_then(|s| s.trim().parse::<u64>().ok())
                .filter(|&ms| ms > 0)
                .map(Duration::from_millis),
            batch_max: lookup("BATCH_MAX_UPLOADS")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(BATCH_MAX_UPLOADS),
            batch_concurrency: lookup("BATCH_CONCURRENCY")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(BATCH_CONCURRENCY),
        };

        let config = Config {
            environment,
            database_url: lookup("DATABASE_URL").filter(|s| !s.is_empty()),
            db_max_connections: lookup("DB_MAX_CONNECTIONS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: parse_u64("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            primary,
            secondary,
            cdn_domain: lookup("CDN_DOMAIN").unwrap_or_default(),
            tuning,
            log_format: lookup("LOG_FORMAT")
                .unwrap_or_else(|| "pretty".to_string())
                .to_lowercase(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.primary.validate("primary")?;
        self.secondary.validate("secondary")?;

        if self.cdn_domain.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "CDN_DOMAIN must be set to build public URLs for the primary backend"
            ));
        }

        if let Some(ref url) = self.database_url {
            if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        } else if self.is_production() {
            return Err(anyhow::anyhow!("DATABASE_URL must be set in production"));
        }

        if self.tuning.max_attempts == 0 {
            return Err(anyhow::anyhow!("UPLOAD_MAX_ATTEMPTS must be at least 1"));
        }

        if self.tuning.batch_max == 0 || self.tuning.batch_concurrency == 0 {
            return Err(anyhow::anyhow!(
                "BATCH_MAX_UPLOADS and BATCH_CONCURRENCY must be at least 1"
            ));
        }

        Ok(())
    }
}
