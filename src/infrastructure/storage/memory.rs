//! In-memory durable tier for development and testing

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;

use super::DurableStore;
use crate::shared::errors::{StorageError, StorageResult};

/// Process-local stand-in for a browser-style key-value store.
///
/// An optional byte quota reproduces "quota exceeded" failures, and the
/// store can be switched offline to simulate an unavailable backend.
pub struct InMemoryStore {
    items: DashMap<String, String>,
    quota_bytes: Option<usize>,
    offline: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
            quota_bytes: None,
            offline: AtomicBool::new(false),
        }
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::new()
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn check_online(&self) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("store is offline".into()));
        }
        Ok(())
    }

    fn used_bytes_excluding(&self, key: &str) -> usize {
        self.items
            .iter()
            .filter(|e| e.key() != key)
            .map(|e| e.key().len() + e.value().len())
            .sum()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DurableStore for InMemoryStore {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        self.check_online()?;
        Ok(self.items.get(key).map(|v| v.value().clone()))
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        self.check_online()?;
        if let Some(limit) = self.quota_bytes {
            let requested = self.used_bytes_excluding(key) + key.len() + value.len();
            if requested > limit {
                return Err(StorageError::QuotaExceeded { requested, limit });
            }
        }
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.check_online()?;
        self.items.remove(key);
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        self.check_online()?;
        Ok(self.items.iter().map(|e| e.key().clone()).collect())
    }
}
