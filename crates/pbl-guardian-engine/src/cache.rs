//! Per-evaluation query cache.
//!
//! Identical external queries within one evaluation (same operation, same
//! corpus, same inputs) resolve to a single call. Concurrent callers of the
//! same key wait on one in-flight future. The cache lives in the
//! evaluation context and is dropped with it.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use pbl_guardian_domain::ContentDigest;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{CollaboratorError, CollaboratorResult};

type Slot = Arc<OnceCell<Arc<dyn Any + Send + Sync>>>;

/// Fingerprint of one external query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(ContentDigest);

impl QueryKey {
    /// Key from an operation name and its ordered inputs.
    pub fn new<I, P>(operation: &str, parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        let mut all: Vec<Vec<u8>> = vec![operation.as_bytes().to_vec()];
        all.extend(parts.into_iter().map(|p| p.as_ref().to_vec()));
        QueryKey(ContentDigest::from_parts(all))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Counters for observing deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Default)]
pub struct QueryCache {
    slots: Mutex<HashMap<QueryKey, Slot>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache").field("stats", &self.stats()).finish()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &QueryKey) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
        slots.entry(key.clone()).or_default().clone()
    }

    /// Return the cached result for `key`, running `fetch` only if no
    /// caller has resolved it yet. Failures are cached too, so a failing
    /// collaborator is not retried within the evaluation.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: QueryKey, fetch: F) -> CollaboratorResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CollaboratorResult<T>>,
    {
        let slot = self.slot(&key);
        let mut ran = false;
        let value = slot
            .get_or_init(|| {
                ran = true;
                async move {
                    let result: CollaboratorResult<T> = fetch().await;
                    Arc::new(result) as Arc<dyn Any + Send + Sync>
                }
            })
            .await
            .clone();

        if ran {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key.as_str(), "query cache hit");
        }

        value
            .downcast_ref::<CollaboratorResult<T>>()
            .cloned()
            .ok_or_else(|| {
                CollaboratorError::Parse(format!(
                    "query cache key {} reused with a different result type",
                    key.as_str()
                ))
            })?
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
