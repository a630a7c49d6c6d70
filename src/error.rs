//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
///
/// The type is `Clone` because one load outcome is handed to every caller
/// that waited on it. Errors raised by user code are kept behind an `Arc`.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Key is absent or expired and no loader could produce it
    #[error("key not found")]
    KeyNotFound,

    /// The configured loader returned an error
    #[error("loader failed: {0}")]
    Loader(Arc<anyhow::Error>),

    /// The configured loader panicked
    #[error("loader panicked: {0}")]
    LoaderPanic(String),

    /// Another caller is loading this key and the caller asked not to wait
    #[error("key is still loading")]
    StillLoading,

    /// The caller's deadline elapsed while waiting for an in-flight load
    #[error("timed out after {0:?} waiting for an in-flight load")]
    Timeout(Duration),

    /// A serialize or deserialize hook rejected a value
    #[error("value transform failed: {0}")]
    Serialization(Arc<anyhow::Error>),

    /// The cache could not be built from the given options
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CacheError {
    /// Wraps an error returned by a loader function.
    pub fn loader(err: anyhow::Error) -> Self {
        CacheError::Loader(Arc::new(err))
    }

    /// Wraps an error returned by a serialize/deserialize hook.
    pub fn serialization(err: anyhow::Error) -> Self {
        CacheError::Serialization(Arc::new(err))
    }

    /// Returns true for errors that came out of the loader, including panics.
    pub fn is_loader_error(&self) -> bool {
        matches!(self, CacheError::Loader(_) | CacheError::LoaderPanic(_))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
