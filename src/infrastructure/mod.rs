//! Infrastructure layer - external concerns

pub mod storage;

pub use storage::{
    CacheItem, CacheSettings, CacheStats, DurableStore, InMemoryStore, JsonFileStore,
    PersistentCache,
};
