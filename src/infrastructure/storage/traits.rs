//! Durable tier trait definitions

use crate::shared::errors::StorageResult;

/// String key-value store that outlives the process (the "durable tier").
///
/// Values are opaque serialized records. Implementations need not be
/// transactional: a single writer at a time is assumed.
pub trait DurableStore: Send + Sync {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> StorageResult<()>;
    fn remove_item(&self, key: &str) -> StorageResult<()>;
    fn keys(&self) -> StorageResult<Vec<String>>;
}
