//! Filesystem stores for permanent and in-flight cache files.

mod perm;
mod temp;

pub use perm::{PermEntry, PermStore, Removal};
pub use temp::TempStore;

use std::fmt;
use std::io;
use std::path::Path;

use tracing::warn;

use crate::config::{CacheConfig, UnknownFiles};

/// Unlink a file, treating an already-missing file as success.
///
/// Concurrent sweeps race to delete the same paths; losing that race is
/// not an error.
pub(crate) fn remove_file_quiet(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

/// Handle a file in a cache directory whose name does not parse.
///
/// Logs the parse failure, then applies the configured policy: `Keep`
/// leaves the file alone, `Remove` unlinks it.
pub(crate) fn apply_unknown_policy(config: &CacheConfig, path: &Path, reason: &dyn fmt::Display) {
    warn!(
        "FileCache ({}): cannot parse cache file '{}': {}",
        config.name,
        path.display(),
        reason
    );
    if config.unknown_files == UnknownFiles::Remove {
        if let Err(err) = remove_file_quiet(path) {
            warn!(
                "FileCache ({}): failed to remove unknown file '{}': {}",
                config.name,
                path.display(),
                err
            );
        }
    }
}
