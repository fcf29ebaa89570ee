//! Keepsake failover engine
//!
//! Durable photo uploads across two object stores. Each upload is routed to a healthy
//! backend, retried on transient failures, failed over from primary to secondary at
//! most once, and recorded together with the backend that ended up holding the bytes.
//!
//! Components, leaves first:
//!
//! - [`HealthProber`]: cached, deduplicated reachability readings per backend
//! - [`RetryingClient`]: one upload against one backend with bounded backoff
//! - [`StorageRouter`]: backend selection and the failover decision
//! - [`StorageRecordPersister`]: the single place the public URL rule is applied
//! - [`UploadOrchestrator`]: the entry point tying them together

pub mod error;
pub mod health;
pub mod orchestrator;
pub mod persister;
pub mod retry;
pub mod router;

pub use error::{AttemptError, FailureClass, UploadError};
pub use health::HealthProber;
pub use orchestrator::{BatchOutcome, UploadOrchestrator, UploadRequest};
pub use persister::{PublicUrlRule, StorageRecordPersister};
pub use retry::{Delay, RetryPolicy, RetryingClient, StoredObject, TokioDelay};
pub use router::StorageRouter;
