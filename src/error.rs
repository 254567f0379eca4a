//! Error types for cache operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by cache operations.
///
/// Cleaner tasks never return these; they log and continue. Caller-facing
/// operations propagate them.
#[derive(Debug, Error)]
pub enum CacheError {
    /// No cache with this name has been started.
    #[error("Unknown cache '{0}'")]
    UnknownCache(String),

    /// Configuration key name not recognized.
    #[error("Unknown configuration key '{key}' for cache '{cache}'")]
    UnknownConfigKey { cache: String, key: String },

    /// Cache name is not a valid directory segment.
    #[error("Invalid cache name '{0}'")]
    BadCacheName(String),

    /// A namespace part resolved to something other than a `/`-free string.
    #[error("Invalid namespace part '{0}'")]
    BadNamespacePart(String),

    /// Id is empty or contains a path separator.
    #[error("Invalid cache id '{0}'")]
    BadId(String),

    /// The commit rename failed; the staged temp file has been removed.
    #[error("Rename from '{from}' to '{to}' failed: {source}")]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    /// The producer failed while yielding chunks; the staged temp file has
    /// been removed.
    #[error("Producer failed: {0}")]
    Producer(io::Error),

    /// Cleaner tasks could not be launched.
    #[error("Cache runtime unavailable: {0}")]
    Runtime(String),

    /// I/O error during cache operations.
    #[error("Cache I/O error: {0}")]
    Io(#[from] io::Error),
}
