//! Storage record persister
//!
//! The only place a [`Photo`] is created and the only place the public URL rule is
//! applied. Records are insert-only.

use chrono::Utc;
use keepsake_core::{AppError, BackendKind, CdnRewriter, NewPhoto, Photo};
use keepsake_db::PhotoRepository;
use keepsake_storage::Storage;
use std::sync::Arc;
use uuid::Uuid;

/// Public URL of a stored object: CDN URL for the primary, direct object URL for the
/// secondary. Deterministic in `(backend, storage_key)`.
#[derive(Clone)]
pub struct PublicUrlRule {
    cdn: Arc<dyn CdnRewriter>,
    secondary: Arc<dyn Storage>,
}

impl PublicUrlRule {
    pub fn new(cdn: Arc<dyn CdnRewriter>, secondary: Arc<dyn Storage>) -> Self {
        Self { cdn, secondary }
    }

    pub fn public_url(&self, backend: BackendKind, storage_key: &str) -> String {
        match backend {
            BackendKind::Primary => self.cdn.rewrite_primary_url(storage_key),
            BackendKind::Secondary => self.secondary.object_url(storage_key),
        }
    }
}

#[derive(Clone)]
pub struct StorageRecordPersister {
    repo: Arc<dyn PhotoRepository>,
    rule: PublicUrlRule,
}

impl StorageRecordPersister {
    pub fn new(repo: Arc<dyn PhotoRepository>, rule: PublicUrlRule) -> Self {
        Self { repo, rule }
    }

    pub fn rule(&self) -> &PublicUrlRule {
        &self.rule
    }

    /// Insert the record for bytes already confirmed on `backend`.
    ///
    /// `backend_url` is what the backend reported; it is compared against the rule and
    /// otherwise ignored.
    pub async fn record_photo(
        &self,
        backend: BackendKind,
        storage_key: &str,
        backend_url: &str,
        size_bytes: u64,
        content_type: &str,
    ) -> Result<Photo, AppError> {
        let public_url = self.rule.public_url(backend, storage_key);

        if backend == BackendKind::Secondary && backend_url != public_url {
            tracing::warn!(
                backend = %backend,
                key = %storage_key,
                reported_url = %backend_url,
                public_url = %public_url,
                "Backend reported a different object URL; keeping the derived one"
            );
        }

        let size_bytes = i64::try_from(size_bytes)
            .map_err(|_| AppError::InvalidInput(format!("size {} out of range", size_bytes)))?;

        let photo = self
            .repo
            .insert(NewPhoto {
                id: Uuid::new_v4(),
                backend_kind: backend,
                storage_key: storage_key.to_string(),
                public_url,
                size_bytes,
                content_type: content_type.to_string(),
                uploaded_at: Utc::now(),
            })
            .await?;

        tracing::info!(
            photo_id = %photo.id,
            backend = %photo.backend_kind,
            key = %photo.storage_key,
            size_bytes = photo.size_bytes,
            "Photo record created"
        );

        Ok(photo)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Photo>, AppError> {
        self.repo.get_by_id(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepsake_core::CdnUrlRewriter;
    use keepsake_db::InMemoryPhotoRepository;
    use keepsake_storage::test_helpers::ScriptedStorage;

    fn persister() -> (Arc<InMemoryPhotoRepository>, StorageRecordPersister) {
        let repo = Arc::new(InMemoryPhotoRepository::new());
        let rule = PublicUrlRule::new(
            Arc::new(CdnUrlRewriter::new("cdn.example.com")),
            Arc::new(ScriptedStorage::new(
                "https://project.supabase.co/storage/v1/object/public/photos",
            )),
        );
        (repo.clone(), StorageRecordPersister::new(repo, rule))
    }

    #[tokio::test]
    async fn primary_records_use_cdn_url() {
        let (_, persister) = persister();
        let photo = persister
            .record_photo(
                BackendKind::Primary,
                "photos/1-a.jpg",
                "https://s3.us-west-002.backblazeb2.com/bucket/photos/1-a.jpg",
                1024,
                "image/jpeg",
            )
            .await
            .unwrap();

        assert_eq!(photo.public_url, "https://cdn.example.com/photos/1-a.jpg");
        assert_eq!(photo.backend_kind, BackendKind::Primary);
        assert_eq!(photo.size_bytes, 1024);
    }

    #[tokio::test]
    async fn secondary_records_use_direct_url() {
        let (_, persister) = persister();
        let photo = persister
            .record_photo(
                BackendKind::Secondary,
                "photos/1-a.jpg",
                "https://elsewhere.test/photos/1-a.jpg",
                10,
                "image/png",
            )
            .await
            .unwrap();

        assert_eq!(
            photo.public_url,
            "https://project.supabase.co/storage/v1/object/public/photos/photos/1-a.jpg"
        );
    }

    #[tokio::test]
    async fn stored_url_is_rederivable() {
        let (_, persister) = persister();
        for backend in [BackendKind::Primary, BackendKind::Secondary] {
            let photo = persister
                .record_photo(backend, "photos/2-b.webp", "", 5, "image/webp")
                .await
                .unwrap();
            assert_eq!(
                persister.rule().public_url(photo.backend_kind, &photo.storage_key),
                photo.public_url
            );
        }
    }

    #[tokio::test]
    async fn each_record_gets_a_fresh_id() {
        let (repo, persister) = persister();
        let a = persister
            .record_photo(BackendKind::Primary, "photos/1-a.jpg", "", 1, "image/jpeg")
            .await
            .unwrap();
        let b = persister
            .record_photo(BackendKind::Primary, "photos/1-b.jpg", "", 1, "image/jpeg")
            .await
            .unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(repo.len(), 2);
        assert_eq!(persister.get(a.id).await.unwrap().unwrap(), a);
    }
}
