//! Photo storage record: where the bytes of one upload live.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage_types::BackendKind;

/// A durably stored photo.
///
/// Created once, after the bytes are confirmed written to `backend_kind`, and never
/// mutated afterwards. Collaborators attach captions, alt text and moderation state to
/// `id` in their own tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Photo {
    pub id: Uuid,
    pub backend_kind: BackendKind,
    pub storage_key: String,
    pub public_url: String,
    pub size_bytes: i64,
    pub content_type: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Insert payload for a photo row. The persister fills every field, including the id.
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub id: Uuid,
    pub backend_kind: BackendKind,
    pub storage_key: String,
    pub public_url: String,
    pub size_bytes: i64,
    pub content_type: String,
    pub uploaded_at: DateTime<Utc>,
}

impl NewPhoto {
    pub fn into_photo(self) -> Photo {
        Photo {
            id: self.id,
            backend_kind: self.backend_kind,
            storage_key: self.storage_key,
            public_url: self.public_url,
            size_bytes: self.size_bytes,
            content_type: self.content_type,
            uploaded_at: self.uploaded_at,
        }
    }
}
