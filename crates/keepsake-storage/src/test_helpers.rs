//! In-memory storage with scripted failures, for exercising retry and failover logic.
//!
//! Enabled by the `test-helpers` feature so crates built on top can drive it from their
//! own tests.

use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What the next `put` call does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    /// Store the object and succeed.
    Store,
    Timeout,
    /// 503-style failure.
    ServerError,
    RateLimited,
    Unauthorized,
    PayloadTooLarge,
    QuotaExhausted,
    /// Store the object, then report a timeout as if the response was lost.
    StoreThenTimeout,
}

/// What `probe` does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    Unhealthy(String),
    /// Never answers; callers must time the probe out.
    Hang,
}

/// Scriptable in-memory [`Storage`].
///
/// `put` consumes outcomes from a queue; once the queue is empty every call uses the
/// fallback outcome (initially [`PutOutcome::Store`]).
pub struct ScriptedStorage {
    base_url: String,
    objects: Mutex<HashMap<String, Bytes>>,
    put_script: Mutex<VecDeque<PutOutcome>>,
    fallback: Mutex<PutOutcome>,
    probe: Mutex<ProbeOutcome>,
    put_latency: Mutex<Duration>,
    put_calls: AtomicUsize,
    probe_calls: AtomicUsize,
}

impl ScriptedStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: Mutex::new(HashMap::new()),
            put_script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(PutOutcome::Store),
            probe: Mutex::new(ProbeOutcome::Healthy),
            put_latency: Mutex::new(Duration::ZERO),
            put_calls: AtomicUsize::new(0),
            probe_calls: AtomicUsize::new(0),
        }
    }

    /// Queue outcomes for the next `put` calls, in order.
    pub fn script_puts(&self, outcomes: impl IntoIterator<Item = PutOutcome>) {
        self.put_script.lock().unwrap().extend(outcomes);
    }

    /// Outcome used once the script is exhausted.
    pub fn fail_all_puts(&self, outcome: PutOutcome) {
        *self.fallback.lock().unwrap() = outcome;
    }

    pub fn set_probe(&self, outcome: ProbeOutcome) {
        *self.probe.lock().unwrap() = outcome;
    }

    /// Simulated latency of every `put`, measured on the tokio clock.
    pub fn set_put_latency(&self, latency: Duration) {
        *self.put_latency.lock().unwrap() = latency;
    }

    /// Pre-populate an object, e.g. to simulate a write that landed earlier.
    pub fn insert_object(&self, key: &str, data: Bytes) {
        self.objects.lock().unwrap().insert(key.to_string(), data);
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    fn next_put_outcome(&self) -> PutOutcome {
        self.put_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().unwrap().clone())
    }

    fn store(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(key) {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }
        objects.insert(key.to_string(), data);
        Ok(())
    }
}

#[async_trait]
impl Storage for ScriptedStorage {
    async fn put(
        &self,
        storage_key: &str,
        data: Bytes,
        _content_type: &str,
    ) -> StorageResult<String> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);

        let latency = *self.put_latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match self.next_put_outcome() {
            PutOutcome::Store => {
                self.store(storage_key, data)?;
                Ok(self.object_url(storage_key))
            }
            PutOutcome::StoreThenTimeout => {
                self.store(storage_key, data)?;
                Err(StorageError::Timeout("response lost".to_string()))
            }
            PutOutcome::Timeout => Err(StorageError::Timeout("request timed out".to_string())),
            PutOutcome::ServerError => {
                Err(StorageError::Unavailable("503 Service Unavailable".to_string()))
            }
            PutOutcome::RateLimited => {
                Err(StorageError::RateLimited("429 Too Many Requests".to_string()))
            }
            PutOutcome::Unauthorized => {
                Err(StorageError::Unauthorized("403 Access Denied".to_string()))
            }
            PutOutcome::PayloadTooLarge => {
                Err(StorageError::PayloadTooLarge("413 Payload Too Large".to_string()))
            }
            PutOutcome::QuotaExhausted => {
                Err(StorageError::QuotaExhausted("403 Cap exceeded".to_string()))
            }
        }
    }

    async fn content_length(&self, storage_key: &str) -> StorageResult<u64> {
        self.object(storage_key)
            .map(|b| b.len() as u64)
            .ok_or_else(|| StorageError::NotFound(storage_key.to_string()))
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        self.objects.lock().unwrap().remove(storage_key);
        Ok(())
    }

    async fn probe(&self) -> StorageResult<()> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.probe.lock().unwrap().clone();
        match outcome {
            ProbeOutcome::Healthy => Ok(()),
            ProbeOutcome::Unhealthy(message) => Err(StorageError::Unavailable(message)),
            ProbeOutcome::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    fn object_url(&self, storage_key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), storage_key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
