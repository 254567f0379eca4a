//! Permanent cache files: commit targets, lookup, and reclamation.
//!
//! There is no index to maintain. A lookup enumerates the wildcard for an
//! id, parses each filename, and resolves the freshest non-expired
//! generation; everything superseded or expired that it touches along the
//! way is scheduled for removal. The sweep and the lookup are the same
//! algorithm, so reading the cache also cleans it.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::cleaner::StaleMailbox;
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::path;
use crate::store::{apply_unknown_policy, remove_file_quiet};
use crate::time;

/// A resolved permanent entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermEntry {
    pub id: String,
    pub path: PathBuf,
    pub expires_at: i64,
}

impl PermEntry {
    /// Time left until this entry expires, zero if a sweep is already due.
    pub fn ttl_remaining(&self) -> Duration {
        let remaining = self.expires_at.saturating_sub(time::epoch_millis());
        Duration::from_millis(remaining.max(0) as u64)
    }
}

/// How a lookup disposes of files it decides are garbage.
#[derive(Clone)]
pub enum Removal {
    /// Unlink inline.
    Sync,
    /// Hand the paths to the stale cleaner, fire-and-forget.
    Deferred(StaleMailbox),
}

/// Store of committed cache files for one named cache.
#[derive(Clone, Debug)]
pub struct PermStore {
    config: Arc<CacheConfig>,
}

impl PermStore {
    pub fn new(config: Arc<CacheConfig>) -> Self {
        Self { config }
    }

    /// Recursively create the permanent directory.
    pub fn setup(&self) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.config.dir)?;
        Ok(())
    }

    /// Compose a fresh commit target for `id`.
    ///
    /// The expiration is `now + ttl`, so it is fixed when the write starts,
    /// not when it commits.
    pub fn file_path(&self, id: &str, ttl: Option<Duration>) -> PathBuf {
        let ttl = ttl.unwrap_or(self.config.ttl);
        path::perm_path(&self.config.dir, id, time::expires_at(ttl))
    }

    /// The freshest non-expired entry for `id`, if any.
    ///
    /// Superseded and expired generations observed during the lookup are
    /// disposed of per `removal`.
    pub fn find(&self, id: &str, removal: &Removal) -> Result<Option<PermEntry>, CacheError> {
        Ok(self.find_all(Some(id), removal)?.remove(id))
    }

    /// Resolve every id matched by the wildcard to its freshest non-expired
    /// entry, sweeping the rest.
    ///
    /// `id` of `None` sweeps the whole cache. On an equal-expiration tie
    /// the first file enumerated wins; both are same-millisecond commits
    /// and either is a correct artifact.
    pub fn find_all(
        &self,
        id: Option<&str>,
        removal: &Removal,
    ) -> Result<HashMap<String, PermEntry>, CacheError> {
        let now = time::epoch_millis();
        let mut acc: HashMap<String, PermEntry> = HashMap::new();

        for matched in self.enumerate(id)? {
            let Some(name) = matched.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let parsed = match path::parse_perm(name) {
                Ok(parsed) => parsed,
                Err(err) => {
                    apply_unknown_policy(&self.config, &matched, &err);
                    continue;
                }
            };
            if parsed.expires_at <= now {
                self.remove_file(&matched, removal);
                continue;
            }
            let entry = PermEntry {
                id: parsed.id,
                path: matched,
                expires_at: parsed.expires_at,
            };
            match acc.get_mut(&entry.id) {
                Some(prev) if prev.expires_at < entry.expires_at => {
                    let superseded = std::mem::replace(prev, entry);
                    self.remove_file(&superseded.path, removal);
                }
                Some(_) => self.remove_file(&entry.path, removal),
                None => {
                    acc.insert(entry.id.clone(), entry);
                }
            }
        }
        Ok(acc)
    }

    /// Synchronously unlink every generation of `id`.
    pub fn delete(&self, id: &str) -> Result<(), CacheError> {
        for matched in self.enumerate(Some(id))? {
            let Some(name) = matched.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            // The wildcard also matches ids that merely end with `$<id>`;
            // only exact parsed ids are deleted.
            if let Ok(parsed) = path::parse_perm(name) {
                if parsed.id == id {
                    remove_file_quiet(&matched)?;
                }
            }
        }
        Ok(())
    }

    /// Synchronously unlink every parseable permanent file, expired or not.
    pub fn clear(&self) -> Result<(), CacheError> {
        for matched in self.enumerate(None)? {
            let Some(name) = matched.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match path::parse_perm(name) {
                Ok(_) => remove_file_quiet(&matched)?,
                Err(err) => apply_unknown_policy(&self.config, &matched, &err),
            }
        }
        Ok(())
    }

    /// Number of parseable permanent files, regardless of expiry.
    pub fn count(&self) -> Result<usize, CacheError> {
        let mut count = 0;
        for matched in self.enumerate(None)? {
            let Some(name) = matched.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if path::parse_perm(name).is_ok() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Dispose of one file per the removal mode.
    ///
    /// Sync unlink errors are logged, not returned; reclamation is
    /// best-effort on every path.
    pub fn remove_file(&self, path: &Path, removal: &Removal) {
        match removal {
            Removal::Sync => {
                if let Err(err) = remove_file_quiet(path) {
                    warn!(
                        "FileCache ({}): failed to remove '{}': {}",
                        self.config.name,
                        path.display(),
                        err
                    );
                }
            }
            Removal::Deferred(mailbox) => {
                mailbox.schedule_removal(vec![path.to_path_buf()]);
            }
        }
    }

    fn enumerate(&self, id: Option<&str>) -> Result<impl Iterator<Item = PathBuf>, CacheError> {
        let pattern = path::perm_wildcard(&self.config.dir, id);
        let paths = glob::glob(&pattern)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        Ok(paths.filter_map(|entry| entry.ok()))
    }
}
