//! Two-tier TTL cache
//!
//! Reads hit a bounded in-memory tier first and fall back to the durable
//! tier, promoting valid entries back into memory. Writes always land in
//! memory and are mirrored to the durable tier only when persistence is
//! enabled. Durable-tier failures are logged and otherwise ignored.
//!
//! The memory tier evicts the oldest *inserted* key when full. It is not an
//! LRU: reads do not refresh an entry's position.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::DurableStore;
use crate::config::AppConfig;
use crate::shared::clock::Clock;

/// Stored envelope: the value, when it was written and how long it lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheItem<T> {
    pub data: T,
    pub timestamp: DateTime<Utc>,
    /// Time to live in milliseconds; absent means the item never expires
    #[serde(default, rename = "expiry")]
    pub expiry_ms: Option<i64>,
}

impl<T> CacheItem<T> {
    pub fn new(data: T, timestamp: DateTime<Utc>, ttl: Option<Duration>) -> Self {
        Self {
            data,
            timestamp,
            expiry_ms: ttl.map(|d| d.num_milliseconds()),
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        match self.expiry_ms {
            None => true,
            Some(ttl) => (now - self.timestamp).num_milliseconds() < ttl,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// TTL applied by [`PersistentCache::set`]; `None` disables expiry
    pub default_ttl: Option<Duration>,
    pub max_memory_items: usize,
    /// Namespace of cache keys in the durable tier
    pub key_prefix: String,
    /// Mirror writes to the durable tier
    pub persistence_enabled: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: Some(Duration::minutes(5)),
            max_memory_items: 100,
            key_prefix: "ev_cache_".to_string(),
            persistence_enabled: false,
        }
    }
}

impl From<&AppConfig> for CacheSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            default_ttl: (cfg.cache.default_ttl_secs > 0)
                .then(|| Duration::seconds(cfg.cache.default_ttl_secs as i64)),
            max_memory_items: cfg.cache.max_memory_items,
            key_prefix: cfg.cache.key_prefix.clone(),
            persistence_enabled: cfg.storage.persistence_enabled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub memory_items: usize,
    pub hits: u64,
    pub misses: u64,
    pub persistence_enabled: bool,
}

// ── Memory tier ────────────────────────────────────────────────

struct MemoryTier {
    items: HashMap<String, CacheItem<Value>>,
    /// Keys in insertion order, oldest first
    order: VecDeque<String>,
    capacity: usize,
}

impl MemoryTier {
    fn new(capacity: usize) -> Self {
        Self {
            items: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn get(&self, key: &str) -> Option<&CacheItem<Value>> {
        self.items.get(key)
    }

    /// Insert or overwrite. Overwriting keeps the key's original position.
    /// Returns the key evicted to make room, if any.
    fn insert(&mut self, key: &str, item: CacheItem<Value>) -> Option<String> {
        if let Some(existing) = self.items.get_mut(key) {
            *existing = item;
            return None;
        }
        if self.capacity == 0 {
            return None;
        }

        let mut evicted = None;
        if self.items.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.items.remove(&oldest);
                evicted = Some(oldest);
            }
        }
        self.order.push_back(key.to_string());
        self.items.insert(key.to_string(), item);
        evicted
    }

    fn remove(&mut self, key: &str) -> bool {
        if self.items.remove(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    fn clear(&mut self) {
        self.items.clear();
        self.order.clear();
    }

    fn expired_keys(&self, now: DateTime<Utc>) -> Vec<String> {
        self.items
            .iter()
            .filter(|(_, item)| !item.is_valid(now))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

// ── PersistentCache ────────────────────────────────────────────

pub struct PersistentCache {
    settings: CacheSettings,
    memory: Mutex<MemoryTier>,
    durable: Option<Arc<dyn DurableStore>>,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PersistentCache {
    /// The durable store is only used when `settings.persistence_enabled`.
    pub fn new(
        settings: CacheSettings,
        durable: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let durable = settings.persistence_enabled.then_some(durable);
        Self {
            memory: Mutex::new(MemoryTier::new(settings.max_memory_items)),
            settings,
            durable,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn memory_only(settings: CacheSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            memory: Mutex::new(MemoryTier::new(settings.max_memory_items)),
            settings: CacheSettings {
                persistence_enabled: false,
                ..settings
            },
            durable: None,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn persistence_enabled(&self) -> bool {
        self.durable.is_some()
    }

    /// Store `value` under the configured default TTL.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        self.set_with_ttl(key, value, self.settings.default_ttl)
    }

    /// Store `value`; `ttl = None` means the item never expires.
    pub fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let data = match serde_json::to_value(value) {
            Ok(data) => data,
            Err(e) => {
                warn!(key, error = %e, "Cache value not serializable, skipping");
                return;
            }
        };
        let item = CacheItem::new(data, self.clock.now(), ttl);

        if let Some(durable) = &self.durable {
            self.write_durable(durable.as_ref(), key, &item);
        }

        if let Some(evicted) = self.memory().insert(key, item) {
            debug!(key = %evicted, "Evicted oldest memory cache entry");
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = self.clock.now();

        let cached = {
            let mut memory = self.memory();
            let cached = memory
                .get(key)
                .map(|item| (item.is_valid(now), item.data.clone()));
            if let Some((false, _)) = cached {
                memory.remove(key);
            }
            cached
        };
        if let Some((true, data)) = cached {
            self.record_hit("memory");
            return self.decode(key, data);
        }

        if let Some(durable) = &self.durable {
            match self.read_durable(durable.as_ref(), key) {
                Some(item) if item.is_valid(now) => {
                    let data = item.data.clone();
                    self.memory().insert(key, item);
                    self.record_hit("durable");
                    return self.decode(key, data);
                }
                Some(_) => {
                    debug!(key, "Evicting expired durable cache entry");
                    self.remove_durable(durable.as_ref(), key);
                }
                None => {}
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cache_lookups_total", "result" => "miss").increment(1);
        None
    }

    pub fn has(&self, key: &str) -> bool {
        self.get::<Value>(key).is_some()
    }

    pub fn remove(&self, key: &str) {
        self.memory().remove(key);
        if let Some(durable) = &self.durable {
            self.remove_durable(durable.as_ref(), key);
        }
    }

    /// Drop every entry of this cache's namespace from both tiers.
    pub fn clear(&self) {
        self.memory().clear();
        if let Some(durable) = &self.durable {
            for key in self.namespaced_durable_keys(durable.as_ref()) {
                if let Err(e) = durable.remove_item(&key) {
                    warn!(key = %key, error = %e, "Failed to clear durable cache entry");
                }
            }
        }
    }

    /// Return the cached value for `key`, or run `producer`, cache its
    /// result and return it. Producer errors are returned unchanged and
    /// nothing is cached. `ttl = None` uses the default TTL.
    pub async fn cache_api_call<T, E, F, Fut>(
        &self,
        key: &str,
        producer: F,
        ttl: Option<Duration>,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get::<T>(key) {
            return Ok(cached);
        }
        let value = producer().await?;
        self.set_with_ttl(key, &value, ttl.or(self.settings.default_ttl));
        Ok(value)
    }

    /// Remove expired entries from both tiers. Returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;

        {
            let mut memory = self.memory();
            for key in memory.expired_keys(now) {
                if memory.remove(&key) {
                    removed += 1;
                }
            }
        }

        if let Some(durable) = &self.durable {
            let prefix_len = self.settings.key_prefix.len();
            for storage_key in self.namespaced_durable_keys(durable.as_ref()) {
                let key = &storage_key[prefix_len..];
                if let Some(item) = self.read_durable(durable.as_ref(), key) {
                    if !item.is_valid(now) {
                        self.remove_durable(durable.as_ref(), key);
                        removed += 1;
                    }
                }
            }
        }

        if removed > 0 {
            debug!(removed, "Cleaned up expired cache entries");
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_items: self.memory().items.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            persistence_enabled: self.persistence_enabled(),
        }
    }

    /// True when `key` is currently held by the memory tier (valid or not).
    pub fn in_memory(&self, key: &str) -> bool {
        self.memory().get(key).is_some()
    }

    // ── Internals ──────────────────────────────────────────────

    fn memory(&self) -> MutexGuard<'_, MemoryTier> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.settings.key_prefix, key)
    }

    fn record_hit(&self, tier: &'static str) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("cache_lookups_total", "result" => "hit", "tier" => tier).increment(1);
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, data: Value) -> Option<T> {
        match serde_json::from_value(data) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Cached value has unexpected shape");
                None
            }
        }
    }

    fn read_durable(&self, durable: &dyn DurableStore, key: &str) -> Option<CacheItem<Value>> {
        let storage_key = self.storage_key(key);
        match durable.get_item(&storage_key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(key, error = %e, "Malformed durable cache entry, discarding");
                    self.remove_durable(durable, key);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Durable cache read failed");
                None
            }
        }
    }

    fn write_durable(&self, durable: &dyn DurableStore, key: &str, item: &CacheItem<Value>) {
        let raw = match serde_json::to_string(item) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize cache entry");
                return;
            }
        };
        if let Err(e) = durable.set_item(&self.storage_key(key), &raw) {
            warn!(key, error = %e, "Durable cache write failed, keeping memory copy only");
        }
    }

    fn remove_durable(&self, durable: &dyn DurableStore, key: &str) {
        if let Err(e) = durable.remove_item(&self.storage_key(key)) {
            warn!(key, error = %e, "Durable cache remove failed");
        }
    }

    fn namespaced_durable_keys(&self, durable: &dyn DurableStore) -> Vec<String> {
        match durable.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter(|k| k.starts_with(&self.settings.key_prefix))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to list durable cache keys");
                Vec::new()
            }
        }
    }
}
