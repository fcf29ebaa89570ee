//! Photo repository: insert and lookup for the photos table.

use async_trait::async_trait;
use keepsake_core::{AppError, NewPhoto, Photo};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

/// Durable store of photo records.
///
/// `insert` writes a complete record in one statement. A record is either fully present
/// or absent; there is no partially written row for readers to observe.
#[async_trait]
pub trait PhotoRepository: Send + Sync {
    async fn insert(&self, photo: NewPhoto) -> Result<Photo, AppError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Photo>, AppError>;
}

/// Postgres-backed repository for the photos table.
#[derive(Clone)]
pub struct PgPhotoRepository {
    pool: PgPool,
}

impl PgPhotoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PhotoRepository for PgPhotoRepository {
    #[tracing::instrument(
        skip(self, photo),
        fields(db.table = "photos", db.record_id = %photo.id, backend = %photo.backend_kind)
    )]
    async fn insert(&self, photo: NewPhoto) -> Result<Photo, AppError> {
        let row: Photo = sqlx::query_as::<Postgres, Photo>(
            r#"
            INSERT INTO photos (id, backend_kind, storage_key, public_url, size_bytes, content_type, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, backend_kind, storage_key, public_url, size_bytes, content_type, uploaded_at
            "#,
        )
        .bind(photo.id)
        .bind(photo.backend_kind)
        .bind(&photo.storage_key)
        .bind(&photo.public_url)
        .bind(photo.size_bytes)
        .bind(&photo.content_type)
        .bind(photo.uploaded_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict(format!("Photo {} already exists", photo.id))
            }
            other => AppError::from(other),
        })?;

        Ok(row)
    }

    #[tracing::instrument(skip(self), fields(db.table = "photos", db.record_id = %id))]
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Photo>, AppError> {
        let row: Option<Photo> = sqlx::query_as::<Postgres, Photo>(
            r#"
            SELECT id, backend_kind, storage_key, public_url, size_bytes, content_type, uploaded_at
            FROM photos
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
