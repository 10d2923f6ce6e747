/// Error types for the request cache layers
///
/// Fetch failures are cloned to every waiter of a deduplicated request,
/// so every variant carries owned, cloneable data.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Fetch error: {0}")] Fetch(String),

    #[error("RPC error from {endpoint}: {message}")] Rpc {
        endpoint: String,
        message: String,
    },

    #[error("Timeout error: fetch timed out after {millis}ms")] Timeout {
        millis: u64,
    },

    #[error("Configuration error: {0}")] Config(String),

    #[error("Cached value for '{key}' has a different type than requested")] TypeMismatch {
        key: String,
    },
}

impl CacheError {
    /// Build a generic fetch error from anything displayable
    pub fn fetch(message: impl std::fmt::Display) -> Self {
        CacheError::Fetch(message.to_string())
    }

    pub fn rpc(endpoint: &str, message: impl std::fmt::Display) -> Self {
        CacheError::Rpc {
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        }
    }

    /// Message without the variant prefix
    pub fn message(&self) -> String {
        match self {
            CacheError::Fetch(message) => message.clone(),
            CacheError::Rpc { message, .. } => message.clone(),
            CacheError::Timeout { millis } => format!("timed out after {}ms", millis),
            CacheError::Config(message) => message.clone(),
            CacheError::TypeMismatch { key } => format!("type mismatch for key {}", key),
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
