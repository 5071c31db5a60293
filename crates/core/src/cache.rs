//! In-process TTL cache for slowly changing CRM reference data.
//!
//! Values are stored type-erased and read back with the type the caller wrote.
//! Expiry is lazy: a read that finds an expired entry evicts it and reports a
//! miss. [`TtlCache::stats`] additionally sweeps every expired entry.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

pub const PIPELINES_TTL: Duration = Duration::from_secs(600);
pub const STAGES_TTL: Duration = Duration::from_secs(600);
pub const CUSTOM_FIELDS_TTL: Duration = Duration::from_secs(3600);
pub const USERS_TTL: Duration = Duration::from_secs(1800);

type Payload = Arc<dyn Any + Send + Sync>;

struct CacheEntry {
    value: Payload,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now <= self.expires_at
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
}

/// Per data-class TTLs chosen by callers of the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheTtls {
    pub pipelines: Duration,
    pub stages: Duration,
    pub custom_fields: Duration,
    pub users: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            pipelines: PIPELINES_TTL,
            stages: STAGES_TTL,
            custom_fields: CUSTOM_FIELDS_TTL,
            users: USERS_TTL,
        }
    }
}

#[derive(Default)]
pub struct TtlCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl std::fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache").field("size", &self.lock().len()).finish()
    }
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T>(&self, key: impl Into<String>, value: T, ttl: Duration)
    where
        T: Any + Send + Sync,
    {
        self.insert(key.into(), Arc::new(value), ttl);
    }

    /// Returns the live value stored under `key`, or `None` on a miss.
    ///
    /// A value stored with a different type than `T` is reported as a miss.
    pub fn get<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let now = Instant::now();
        let mut entries = self.lock();
        let live = entries.get(key).map(|entry| entry.is_live(now))?;
        if !live {
            entries.remove(key);
            return None;
        }
        entries.get(key).and_then(|entry| Arc::clone(&entry.value).downcast::<T>().ok())
    }

    /// True while a live entry exists under `key`, whatever its type.
    ///
    /// This checks presence only: `has` can be true while [`get`](Self::get) with a
    /// different `T` still reports a miss. Expired entries are evicted here.
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => true,
            Some(_) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Returns the cached value for `key`, computing and storing it on a miss.
    ///
    /// A failed computation stores nothing and its error is returned unchanged.
    /// Concurrent misses for the same key may each run `compute`.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<Arc<T>, E>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(key) {
            tracing::debug!(event_name = "cache.hit", key, "cache hit");
            return Ok(hit);
        }

        tracing::debug!(event_name = "cache.miss", key, "cache miss, computing value");
        let value = Arc::new(compute().await?);
        self.insert(key.to_string(), Arc::clone(&value) as Payload, ttl);
        Ok(value)
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let mut entries = self.lock();
        entries.retain(|_, entry| entry.is_live(now));

        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        CacheStats { size: keys.len(), keys }
    }

    fn insert(&self, key: String, value: Payload, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.lock().insert(key, CacheEntry { value, expires_at });
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Builds a cache key, prefixing it with a tenant namespace when one is given.
pub fn namespaced_key(namespace: Option<&str>, key: &str) -> String {
    match namespace {
        Some(namespace) if !namespace.is_empty() => format!("{namespace}:{key}"),
        _ => key.to_string(),
    }
}
