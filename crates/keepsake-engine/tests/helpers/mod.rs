//! Test helpers: build an upload engine over scripted backends and an in-memory
//! repository.
//!
//! Run from workspace root: `cargo test -p keepsake-engine --test failover_test`.

use keepsake_core::{CdnUrlRewriter, EngineTuning};
use keepsake_db::InMemoryPhotoRepository;
use keepsake_engine::UploadOrchestrator;
use keepsake_storage::test_helpers::ScriptedStorage;
use std::sync::Arc;

pub const CDN_DOMAIN: &str = "cdn.example.com";
pub const SECONDARY_BASE_URL: &str = "https://project.supabase.co/storage/v1/object/public/photos";

/// Engine under test plus handles on everything it talks to.
pub struct TestEngine {
    pub engine: UploadOrchestrator,
    pub primary: Arc<ScriptedStorage>,
    pub secondary: Arc<ScriptedStorage>,
    pub repo: Arc<InMemoryPhotoRepository>,
}

pub fn setup_engine() -> TestEngine {
    setup_engine_with(EngineTuning::default())
}

pub fn setup_engine_with(tuning: EngineTuning) -> TestEngine {
    let primary = Arc::new(ScriptedStorage::new(
        "https://s3.us-west-002.backblazeb2.com/wedding-photos",
    ));
    let secondary = Arc::new(ScriptedStorage::new(SECONDARY_BASE_URL));
    let repo = Arc::new(InMemoryPhotoRepository::new());

    let engine = UploadOrchestrator::new(
        primary.clone(),
        secondary.clone(),
        repo.clone(),
        Arc::new(CdnUrlRewriter::new(CDN_DOMAIN)),
        &tuning,
    );

    TestEngine {
        engine,
        primary,
        secondary,
        repo,
    }
}

pub fn jpeg_bytes() -> bytes::Bytes {
    bytes::Bytes::from_static(b"\xff\xd8\xff\xe0\x00\x10JFIF\x00 wedding photo")
}
