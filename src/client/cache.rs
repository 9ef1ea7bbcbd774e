//! Keyed response cache with per-key request de-duplication.
//!
//! Entries are served while younger than the caller's stale time. Concurrent
//! callers for the same key share one in-flight fetch; callers that were
//! waiting on a failed fetch get that failure instead of issuing their own.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::resource::CacheKey;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Arc<Value>,
    fetched_at: Instant,
}

#[derive(Debug, Clone)]
struct FailedFetch {
    message: String,
    at: Instant,
}

/// What the cache knows about one key, for rendering loading and error states.
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    pub data: Option<Arc<Value>>,
    pub error: Option<String>,
    pub updated_at: Option<Instant>,
}

#[derive(Default)]
pub struct QueryCache {
    entries: DashMap<CacheKey, CacheEntry>,
    in_flight: DashMap<CacheKey, Arc<Mutex<()>>>,
    errors: DashMap<CacheKey, FailedFetch>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh(&self, key: &CacheKey, stale_after: Duration) -> Option<Arc<Value>> {
        let entry = self.entries.get(key)?;
        (entry.fetched_at.elapsed() < stale_after).then(|| Arc::clone(&entry.value))
    }

    /// Serve `key` from cache if fresh, otherwise run `fetch` once for every
    /// concurrent caller of this key.
    pub async fn get_or_fetch<F, Fut>(&self, key: &CacheKey, stale_after: Duration, fetch: F) -> Result<Arc<Value>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if let Some(value) = self.fresh(key, stale_after) {
            return Ok(value);
        }

        let waited_since = Instant::now();
        let gate = Arc::clone(self.in_flight.entry(key.clone()).or_default().value());
        let _guard = gate.lock().await;

        // Whoever held the gate may have filled or failed this key meanwhile.
        if let Some(value) = self.fresh(key, stale_after) {
            return Ok(value);
        }
        if let Some(failed) = self.errors.get(key) {
            if failed.at > waited_since {
                return Err(AppError::Fetch(failed.message.clone()));
            }
        }

        debug!(key = %key, "cache miss");
        match fetch().await {
            Ok(value) => {
                let value = Arc::new(value);
                self.entries.insert(
                    key.clone(),
                    CacheEntry { value: Arc::clone(&value), fetched_at: Instant::now() },
                );
                self.errors.remove(key);
                Ok(value)
            }
            Err(e) => {
                self.errors.insert(key.clone(), FailedFetch { message: e.to_string(), at: Instant::now() });
                Err(e)
            }
        }
    }

    /// Last known data and error for `key`. Data survives a later failed refetch.
    pub fn state(&self, key: &CacheKey) -> QueryState {
        let entry = self.entries.get(key);
        QueryState {
            data: entry.as_ref().map(|e| Arc::clone(&e.value)),
            updated_at: entry.as_ref().map(|e| e.fetched_at),
            error: self.errors.get(key).map(|f| f.message.clone()),
        }
    }

    pub fn invalidate(&self, key: &CacheKey) {
        self.entries.remove(key);
        self.errors.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.errors.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::resource::{CoinListParams, Resource};

    fn key(page: u32) -> CacheKey {
        Resource::CoinList(CoinListParams::page(50, page)).cache_key()
    }

    async fn counted(calls: &AtomicUsize, value: Value) -> Result<Value> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entry_is_served_without_refetch() {
        let cache = QueryCache::new();
        let calls = AtomicUsize::new(0);
        let k = key(1);
        let stale = Duration::from_secs(120);

        let first = cache.get_or_fetch(&k, stale, || counted(&calls, json!([1]))).await.unwrap();
        tokio::time::advance(Duration::from_secs(119)).await;
        let second = cache.get_or_fetch(&k, stale, || counted(&calls, json!([2]))).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_entry_is_refetched() {
        let cache = QueryCache::new();
        let calls = AtomicUsize::new(0);
        let k = key(1);
        let stale = Duration::from_secs(60);

        cache.get_or_fetch(&k, stale, || counted(&calls, json!(1))).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        let v = cache.get_or_fetch(&k, stale, || counted(&calls, json!(2))).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*v, json!(2));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_fetch() {
        let cache = QueryCache::new();
        let calls = AtomicUsize::new(0);
        let k = key(1);
        let stale = Duration::from_secs(60);

        let calls_ref = &calls;
        let slow = move || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<_, AppError>(json!({"ok": true}))
        };

        let results = futures_util::future::join_all(
            (0..4).map(|_| cache.get_or_fetch(&k, stale, slow)),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r.as_ref().unwrap()["ok"] == json!(true)));
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_on_a_failed_fetch_share_the_failure() {
        let cache = QueryCache::new();
        let calls = AtomicUsize::new(0);
        let k = key(1);
        let stale = Duration::from_secs(60);

        let calls_ref = &calls;
        let failing = move || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            Err::<Value, _>(AppError::Upstream { status: 429, body: "slow down".to_string() })
        };

        let (a, b) = tokio::join!(
            cache.get_or_fetch(&k, stale, failing),
            cache.get_or_fetch(&k, stale, failing)
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(a, Err(AppError::Upstream { status: 429, .. })));
        assert!(matches!(b, Err(AppError::Fetch(ref m)) if m.contains("429")));
        assert!(cache.state(&k).error.is_some());

        // A later caller is not blocked by the old failure.
        let v = cache.get_or_fetch(&k, stale, || counted(&calls, json!(7))).await.unwrap();
        assert_eq!(*v, json!(7));
        assert!(cache.state(&k).error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let cache = QueryCache::new();
        let calls = AtomicUsize::new(0);
        let stale = Duration::from_secs(60);

        cache.get_or_fetch(&key(1), stale, || counted(&calls, json!(1))).await.unwrap();
        cache.get_or_fetch(&key(2), stale, || counted(&calls, json!(2))).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refetch_keeps_previous_data() {
        let cache = QueryCache::new();
        let k = key(1);
        let stale = Duration::from_secs(60);

        cache.get_or_fetch(&k, stale, || async { Ok(json!("old")) }).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        let err = cache
            .get_or_fetch(&k, stale, || async { Err(AppError::Fetch("down".to_string())) })
            .await;
        assert!(err.is_err());

        let state = cache.state(&k);
        assert_eq!(state.data.as_deref(), Some(&json!("old")));
        assert!(state.error.is_some());
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let cache = QueryCache::new();
        let calls = AtomicUsize::new(0);
        let k = key(1);
        let stale = Duration::from_secs(600);

        cache.get_or_fetch(&k, stale, || counted(&calls, json!(1))).await.unwrap();
        cache.invalidate(&k);
        cache.get_or_fetch(&k, stale, || counted(&calls, json!(1))).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        cache.clear();
        assert!(cache.is_empty());
    }
}
