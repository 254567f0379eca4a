//! Temp staging files for in-flight writes.
//!
//! Every write stages into a temp file named after its producer; the
//! commit renames it into the permanent store. Unique tokens are a
//! process-global counter, so two concurrent writes to the same id never
//! collide on a staging path.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::owner::OwnerToken;
use crate::path::{self, ParseError, TempName};

static NEXT_UNIQUE: AtomicU64 = AtomicU64::new(0);

fn next_unique() -> u64 {
    NEXT_UNIQUE.fetch_add(1, Ordering::Relaxed)
}

/// Store of in-flight staging files for one named cache.
#[derive(Clone, Debug)]
pub struct TempStore {
    config: Arc<CacheConfig>,
}

impl TempStore {
    pub fn new(config: Arc<CacheConfig>) -> Self {
        Self { config }
    }

    /// Recursively create the temp directory.
    pub fn setup(&self) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.config.temp_dir)?;
        Ok(())
    }

    /// Allocate a fresh staging path for `id`, owned by `owner`.
    pub fn file_path(&self, id: &str, owner: &OwnerToken) -> PathBuf {
        path::temp_path(&self.config.temp_dir, id, owner, next_unique())
    }

    /// Glob pattern matching every temp file of this cache.
    pub fn wildcard(&self) -> String {
        path::temp_wildcard(&self.config.temp_dir)
    }

    /// Parse the owner, unique token, and id out of a temp file path.
    pub fn parse_filepath(&self, path: &Path) -> Result<TempName, ParseError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or(ParseError::BadFormat)?;
        path::parse_temp(name)
    }

    /// Enumerate every temp file of this cache.
    pub fn enumerate(&self) -> Result<impl Iterator<Item = PathBuf>, CacheError> {
        let paths = glob::glob(&self.wildcard())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        Ok(paths.filter_map(|entry| entry.ok()))
    }

    /// Number of parseable temp files, in-flight writes included.
    pub fn count(&self) -> Result<usize, CacheError> {
        let mut count = 0;
        for matched in self.enumerate()? {
            let Some(name) = matched.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if path::parse_temp(name).is_ok() {
                count += 1;
            }
        }
        Ok(count)
    }
}
