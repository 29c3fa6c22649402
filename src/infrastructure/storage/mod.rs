//! Storage tiers and the cache built on them

mod cache;
mod file;
mod memory;
mod traits;

pub use cache::{CacheItem, CacheSettings, CacheStats, PersistentCache};
pub use file::JsonFileStore;
pub use memory::InMemoryStore;
pub use traits::DurableStore;
