mod helpers;

use helpers::{jpeg_bytes, setup_engine, setup_engine_with, CDN_DOMAIN, SECONDARY_BASE_URL};
use keepsake_core::{BackendKind, EngineTuning, ErrorMetadata};
use keepsake_engine::{FailureClass, UploadError, UploadRequest};
use keepsake_storage::test_helpers::{ProbeOutcome, PutOutcome};
use futures::future::join_all;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn healthy_primary_stores_on_first_try() {
    let t = setup_engine();

    let photo = t
        .engine
        .store_upload(jpeg_bytes(), "image/jpeg", None)
        .await
        .unwrap();

    assert_eq!(photo.backend_kind, BackendKind::Primary);
    assert_eq!(
        photo.public_url,
        format!("https://{}/{}", CDN_DOMAIN, photo.storage_key)
    );
    assert_eq!(photo.size_bytes, jpeg_bytes().len() as i64);
    assert_eq!(photo.content_type, "image/jpeg");
    assert_eq!(t.primary.put_calls(), 1);
    assert_eq!(t.secondary.put_calls(), 0);
    assert_eq!(t.repo.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_errors_are_retried_on_primary() {
    let t = setup_engine();
    t.primary
        .script_puts([PutOutcome::ServerError, PutOutcome::Timeout, PutOutcome::Store]);

    let photo = t
        .engine
        .store_upload(jpeg_bytes(), "image/jpeg", None)
        .await
        .unwrap();

    assert_eq!(photo.backend_kind, BackendKind::Primary);
    assert_eq!(t.primary.put_calls(), 3);
    assert_eq!(t.secondary.put_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn unhealthy_primary_is_skipped() {
    let t = setup_engine();
    t.primary
        .set_probe(ProbeOutcome::Unhealthy("503 Service Unavailable".into()));

    let photo = t
        .engine
        .store_upload(jpeg_bytes(), "image/png", None)
        .await
        .unwrap();

    assert_eq!(photo.backend_kind, BackendKind::Secondary);
    assert_eq!(
        photo.public_url,
        format!("{}/{}", SECONDARY_BASE_URL, photo.storage_key)
    );
    assert_eq!(t.primary.put_calls(), 0);
    assert_eq!(t.secondary.put_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn permanent_primary_error_fails_over_once() {
    let t = setup_engine();
    t.primary.script_puts([PutOutcome::Unauthorized]);

    let photo = t
        .engine
        .store_upload(jpeg_bytes(), "image/jpeg", None)
        .await
        .unwrap();

    assert_eq!(photo.backend_kind, BackendKind::Secondary);
    assert_eq!(t.primary.put_calls(), 1);
    assert_eq!(t.secondary.put_calls(), 1);
    assert!(t.secondary.object(&photo.storage_key).is_some());
    assert!(t.primary.object(&photo.storage_key).is_none());
}

#[tokio::test(start_paused = true)]
async fn both_backends_failing_is_failover_exhausted() {
    let t = setup_engine();
    t.primary.fail_all_puts(PutOutcome::ServerError);
    t.secondary.fail_all_puts(PutOutcome::QuotaExhausted);

    let err = t
        .engine
        .store_upload(jpeg_bytes(), "image/jpeg", None)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        UploadError::FailoverExhausted {
            primary: FailureClass::Transient,
            secondary: FailureClass::Permanent,
        }
    );
    assert_eq!(err.client_message(), "Upload failed, please retry");
    assert_eq!(t.primary.put_calls(), 3);
    assert_eq!(t.secondary.put_calls(), 1);
    assert!(t.repo.is_empty());
}

#[tokio::test(start_paused = true)]
async fn deadline_cuts_off_slow_backend() {
    let t = setup_engine();
    t.primary.set_put_latency(Duration::from_millis(500));

    let started = Instant::now();
    let err = t
        .engine
        .store_upload(jpeg_bytes(), "image/jpeg", Some(Duration::from_millis(50)))
        .await
        .unwrap_err();

    assert_eq!(err, UploadError::DeadlineExceeded);
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(t.primary.object_count(), 0);
    assert_eq!(t.secondary.put_calls(), 0);
    assert!(t.repo.is_empty());
}

#[tokio::test(start_paused = true)]
async fn configured_default_deadline_applies() {
    let t = setup_engine_with(EngineTuning {
        default_deadline: Some(Duration::from_millis(100)),
        ..EngineTuning::default()
    });
    t.primary.set_put_latency(Duration::from_secs(1));

    let err = t
        .engine
        .store(UploadRequest::new(jpeg_bytes(), "image/jpeg"))
        .await
        .unwrap_err();

    assert_eq!(err, UploadError::DeadlineExceeded);
    assert!(t.repo.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_primary_is_not_reprobed_within_ttl() {
    let t = setup_engine();
    t.primary.script_puts([PutOutcome::Unauthorized]);

    t.engine
        .store_upload(jpeg_bytes(), "image/jpeg", None)
        .await
        .unwrap();
    let second = t
        .engine
        .store_upload(jpeg_bytes(), "image/jpeg", None)
        .await
        .unwrap();

    assert_eq!(second.backend_kind, BackendKind::Secondary);
    assert_eq!(t.primary.put_calls(), 1);
    assert_eq!(t.primary.probe_calls(), 1);

    tokio::time::advance(Duration::from_secs(31)).await;
    let third = t
        .engine
        .store_upload(jpeg_bytes(), "image/jpeg", None)
        .await
        .unwrap();
    assert_eq!(third.backend_kind, BackendKind::Primary);
    assert_eq!(t.primary.probe_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn retries_are_bounded_on_both_backends() {
    let t = setup_engine();
    t.primary.fail_all_puts(PutOutcome::RateLimited);
    t.secondary.fail_all_puts(PutOutcome::Timeout);

    let err = t
        .engine
        .store_upload(jpeg_bytes(), "image/jpeg", None)
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::FailoverExhausted { .. }));
    assert_eq!(t.primary.put_calls(), 3);
    assert_eq!(t.secondary.put_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn secondary_failure_never_falls_back_to_primary() {
    let t = setup_engine();
    t.primary.set_probe(ProbeOutcome::Unhealthy("down".into()));
    t.secondary.fail_all_puts(PutOutcome::PayloadTooLarge);

    let err = t
        .engine
        .store_upload(jpeg_bytes(), "image/jpeg", None)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        UploadError::Permanent {
            backend: BackendKind::Secondary
        }
    );
    assert_eq!(t.primary.put_calls(), 0);
    assert_eq!(t.secondary.put_calls(), 1);
    assert!(t.repo.is_empty());
}

#[tokio::test(start_paused = true)]
async fn lost_response_does_not_duplicate_object() {
    let t = setup_engine();
    t.primary.script_puts([PutOutcome::StoreThenTimeout]);

    let photo = t
        .engine
        .store_upload(jpeg_bytes(), "image/jpeg", None)
        .await
        .unwrap();

    assert_eq!(photo.backend_kind, BackendKind::Primary);
    assert_eq!(t.primary.put_calls(), 2);
    assert_eq!(t.primary.object_count(), 1);
    assert_eq!(t.repo.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn persistence_failure_reports_orphaned_key() {
    let t = setup_engine();
    t.repo.fail_next_inserts(1);

    let err = t
        .engine
        .store_upload(jpeg_bytes(), "image/jpeg", None)
        .await
        .unwrap_err();

    let storage_key = match &err {
        UploadError::PersistenceFailed {
            backend: BackendKind::Primary,
            storage_key,
        } => storage_key.clone(),
        other => panic!("unexpected error: {other:?}"),
    };
    assert!(t.primary.object(&storage_key).is_some());
    assert!(t.repo.is_empty());
    assert_eq!(err.error_code(), "PERSISTENCE_FAILED");
}

#[tokio::test(start_paused = true)]
async fn stored_records_are_stable_and_rederivable() {
    let t = setup_engine();
    let first = t
        .engine
        .store_upload(jpeg_bytes(), "image/jpeg", None)
        .await
        .unwrap();

    // Later outages and failovers must not touch the existing record.
    t.primary.fail_all_puts(PutOutcome::Unauthorized);
    let second = t
        .engine
        .store_upload(jpeg_bytes(), "image/jpeg", None)
        .await
        .unwrap();
    assert_eq!(second.backend_kind, BackendKind::Secondary);

    let reread = t.engine.get(first.id).await.unwrap().unwrap();
    assert_eq!(reread, first);

    for photo in t.repo.all() {
        let expected = match photo.backend_kind {
            BackendKind::Primary => format!("https://{}/{}", CDN_DOMAIN, photo.storage_key),
            BackendKind::Secondary => format!("{}/{}", SECONDARY_BASE_URL, photo.storage_key),
        };
        assert_eq!(photo.public_url, expected);
    }
}

#[tokio::test(start_paused = true)]
async fn hanging_probe_routes_to_secondary() {
    let t = setup_engine();
    t.primary.set_probe(ProbeOutcome::Hang);

    let photo = t
        .engine
        .store_upload(jpeg_bytes(), "image/jpeg", None)
        .await
        .unwrap();

    assert_eq!(photo.backend_kind, BackendKind::Secondary);
    assert_eq!(t.primary.put_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn rejected_request_keeps_primary_in_service() {
    let t = setup_engine();
    t.primary.script_puts([PutOutcome::PayloadTooLarge]);

    let first = t
        .engine
        .store_upload(jpeg_bytes(), "image/jpeg", None)
        .await
        .unwrap();
    assert_eq!(first.backend_kind, BackendKind::Secondary);

    let second = t
        .engine
        .store_upload(jpeg_bytes(), "image/jpeg", None)
        .await
        .unwrap();

    assert_eq!(second.backend_kind, BackendKind::Primary);
    assert_eq!(t.primary.put_calls(), 2);
    assert_eq!(t.primary.probe_calls(), 1);
    let status = t.engine.prober().status(BackendKind::Primary).unwrap();
    assert!(status.healthy);
}

#[tokio::test(start_paused = true)]
async fn deadline_expiring_on_secondary_stops_the_upload() {
    let t = setup_engine();
    t.primary.script_puts([PutOutcome::Unauthorized]);
    t.secondary.set_put_latency(Duration::from_millis(500));

    let started = Instant::now();
    let err = t
        .engine
        .store_upload(jpeg_bytes(), "image/jpeg", Some(Duration::from_millis(100)))
        .await
        .unwrap_err();

    assert_eq!(err, UploadError::DeadlineExceeded);
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(t.primary.put_calls(), 1);
    assert_eq!(t.secondary.put_calls(), 1);
    assert_eq!(t.secondary.object_count(), 0);
    assert!(t.repo.is_empty());
}

#[tokio::test(start_paused = true)]
async fn transfer_finishing_at_the_deadline_writes_no_record() {
    let t = setup_engine();
    t.primary.set_put_latency(Duration::from_millis(100));

    let err = t
        .engine
        .store_upload(jpeg_bytes(), "image/jpeg", Some(Duration::from_millis(100)))
        .await
        .unwrap_err();

    assert_eq!(err, UploadError::DeadlineExceeded);
    // The bytes landed; only the record is withheld.
    assert_eq!(t.primary.object_count(), 1);
    assert!(t.repo.is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_uploads_against_flapping_primary_stay_independent() {
    let t = setup_engine();
    t.primary.script_puts([
        PutOutcome::Store,
        PutOutcome::Unauthorized,
        PutOutcome::Store,
        PutOutcome::PayloadTooLarge,
        PutOutcome::ServerError,
        PutOutcome::Store,
        PutOutcome::Timeout,
        PutOutcome::ServerError,
    ]);

    let uploads = (0..8).map(|_| t.engine.store_upload(jpeg_bytes(), "image/jpeg", None));
    let results = join_all(uploads).await;

    let photos: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(t.repo.len(), photos.len());

    let mut on_secondary = 0;
    for photo in &photos {
        let (home, other) = match photo.backend_kind {
            BackendKind::Primary => (&t.primary, &t.secondary),
            BackendKind::Secondary => {
                on_secondary += 1;
                (&t.secondary, &t.primary)
            }
        };
        assert!(home.object(&photo.storage_key).is_some());
        assert!(other.object(&photo.storage_key).is_none());
    }

    // The secondary always accepts on the first try, so each upload that reached it
    // made exactly one call there and never went back to the primary.
    assert_eq!(t.secondary.put_calls(), on_secondary);
    assert_eq!(t.primary.object_count(), photos.len() - on_secondary);
    assert!(t.primary.put_calls() <= photos.len() * 3);
}
