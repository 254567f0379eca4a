//! Filesystem-backed, TTL-indexed content cache.
//!
//! Artifacts are regular files whose basenames encode their expiration, so
//! there is no index to maintain or repair: the directory *is* the index.
//! Writes stage into temp files and commit with an atomic rename; partial
//! content is never observable under a permanent name. Two background
//! tasks per cache reclaim expired permanent files and staging files whose
//! producer is gone. Multiple independent named caches coexist in one
//! process, each with its own directories, TTL, namespacing, and cleaner
//! schedules.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use filecache::{CacheOptions, FileCache};
//!
//! let cache = FileCache::start(
//!     CacheOptions::new("thumbnails")
//!         .with_dir("/var/cache/app")
//!         .with_ttl(Duration::from_secs(3600)),
//! )?;
//!
//! cache.put("user-1.png", png_bytes)?;
//! if let Some(reader) = cache.get("user-1.png")? {
//!     let bytes = reader.bytes()?;
//! }
//! ```
//!
//! `temp_dir` and `dir` must resolve to one filesystem; the commit rename
//! is only atomic within one. By default the temp root equals the
//! permanent root, which satisfies this automatically.

pub mod cleaner;
pub mod config;
pub mod error;
pub mod namespace;
pub mod owner;
pub mod path;
pub mod producer;
pub mod registry;
pub mod service;
pub mod store;
pub mod stream;
pub mod time;

pub use config::{CacheConfig, CacheOptions, ConfigValue, UnknownFiles};
pub use error::CacheError;
pub use namespace::{Namespace, NamespacePart};
pub use producer::Producer;
pub use service::{CacheRecord, FileCache, Stats, WriteOptions};
pub use stream::CacheReader;

/// Version of the filecache library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
