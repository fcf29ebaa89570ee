use async_trait::async_trait;
use keepsake_core::{AppError, NewPhoto, Photo};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use super::photo::PhotoRepository;

/// Process-local photo repository.
///
/// Records vanish with the process. Used when no `DATABASE_URL` is configured and as the
/// repository double in tests, where `fail_next_inserts` simulates database outages.
#[derive(Default)]
pub struct InMemoryPhotoRepository {
    photos: Mutex<HashMap<Uuid, Photo>>,
    failing_inserts: AtomicUsize,
}

impl InMemoryPhotoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` inserts fail with a database error.
    pub fn fail_next_inserts(&self, count: usize) {
        self.failing_inserts.store(count, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<Photo> {
        let mut photos: Vec<Photo> = self.lock().values().cloned().collect();
        photos.sort_by_key(|p| p.uploaded_at);
        photos
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Photo>> {
        // A poisoned map is still structurally valid; keep serving it.
        self.photos.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_inserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl PhotoRepository for InMemoryPhotoRepository {
    async fn insert(&self, photo: NewPhoto) -> Result<Photo, AppError> {
        if self.take_injected_failure() {
            return Err(AppError::Internal(
                "simulated database outage".to_string(),
            ));
        }

        let mut photos = self.lock();
        if photos.contains_key(&photo.id) {
            return Err(AppError::Conflict(format!(
                "Photo {} already exists",
                photo.id
            )));
        }

        let stored = photo.into_photo();
        photos.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Photo>, AppError> {
        Ok(self.lock().get(&id).cloned())
    }
}
