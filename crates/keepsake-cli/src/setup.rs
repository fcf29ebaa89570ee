//! Wiring: build storage backends, the repository and the engine from configuration.

use anyhow::{Context, Result};
use keepsake_core::{BackendKind, CdnUrlRewriter, Config};
use keepsake_db::{setup_database, InMemoryPhotoRepository, PgPhotoRepository, PhotoRepository};
use keepsake_engine::UploadOrchestrator;
use keepsake_storage::{create_storage, Storage};
use std::sync::Arc;

pub struct Services {
    pub engine: UploadOrchestrator,
    pub primary: Arc<dyn Storage>,
    pub secondary: Arc<dyn Storage>,
}

impl Services {
    pub fn storage(&self, backend: BackendKind) -> &Arc<dyn Storage> {
        match backend {
            BackendKind::Primary => &self.primary,
            BackendKind::Secondary => &self.secondary,
        }
    }
}

pub async fn build_services(config: &Config) -> Result<Services> {
    let primary = create_storage(&config.primary, &config.tuning)
        .await
        .context("Failed to initialize primary storage backend")?;
    let secondary = create_storage(&config.secondary, &config.tuning)
        .await
        .context("Failed to initialize secondary storage backend")?;

    let repo: Arc<dyn PhotoRepository> = if config.database_url.is_some() {
        let pool = setup_database(config).await?;
        Arc::new(PgPhotoRepository::new(pool))
    } else {
        tracing::warn!("DATABASE_URL not set, photo records are kept in memory only");
        Arc::new(InMemoryPhotoRepository::new())
    };

    let cdn = Arc::new(CdnUrlRewriter::new(config.cdn_domain.clone()));

    tracing::info!(
        environment = %config.environment,
        primary_backend = %primary.backend_type(),
        secondary_backend = %secondary.backend_type(),
        cdn_domain = %cdn.domain(),
        "Upload engine configured"
    );

    let engine = UploadOrchestrator::new(
        primary.clone(),
        secondary.clone(),
        repo,
        cdn,
        &config.tuning,
    );

    Ok(Services {
        engine,
        primary,
        secondary,
    })
}
