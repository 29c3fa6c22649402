use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Validation: {0}")]
    Validation(String),

    #[error("Cannot {action} while booking flow is {state}")]
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },
}

/// Failures of the durable tier. These never reach callers of the cache or
/// the ledger; they are logged and the operation degrades to memory-only.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Quota exceeded: {requested} bytes requested, {limit} bytes allowed")]
    QuotaExceeded { requested: usize, limit: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

pub type DomainResult<T> = Result<T, DomainError>;
pub type StorageResult<T> = Result<T, StorageError>;
