//! Cache configuration.
//!
//! [`CacheOptions`] is the caller-facing builder; [`CacheOptions::build`]
//! validates it and freezes it into an immutable [`CacheConfig`] with fully
//! resolved directory roots. Configs are published to the process-wide
//! registry at startup and re-read by name on every cache operation.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::CacheError;
use crate::namespace::Namespace;

/// Default TTL for committed entries.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Default period of both cleaners.
pub const DEFAULT_CLEAN_INTERVAL: Duration = Duration::from_secs(60);

/// What to do with files in a cache directory whose name does not parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownFiles {
    /// Leave them alone.
    #[default]
    Keep,
    /// Unlink them during sweeps.
    Remove,
}

/// Builder for a named cache.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use filecache::{CacheOptions, Namespace, UnknownFiles};
///
/// let options = CacheOptions::new("thumbnails")
///     .with_dir("/var/cache/app")
///     .with_ttl(Duration::from_secs(300))
///     .with_temp_namespace(Namespace::new().host())
///     .with_unknown_files(UnknownFiles::Remove);
/// ```
#[derive(Debug, Clone)]
pub struct CacheOptions {
    name: String,
    dir: Option<PathBuf>,
    temp_dir: Option<PathBuf>,
    ttl: Duration,
    namespace: Namespace,
    temp_namespace: Namespace,
    stale_clean_interval: Duration,
    temp_clean_interval: Duration,
    unknown_files: UnknownFiles,
    verbose: bool,
}

impl CacheOptions {
    /// Start building options for the cache called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dir: None,
            temp_dir: None,
            ttl: DEFAULT_TTL,
            namespace: Namespace::new(),
            temp_namespace: Namespace::new(),
            stale_clean_interval: DEFAULT_CLEAN_INTERVAL,
            temp_clean_interval: DEFAULT_CLEAN_INTERVAL,
            unknown_files: UnknownFiles::default(),
            verbose: false,
        }
    }

    /// Root of permanent files. Defaults to `<user cache dir>/filecache`.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Root of temp files. Defaults to the permanent root, which keeps the
    /// commit rename on one filesystem.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Default TTL added to the write time to form the expiration.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Namespace applied under the permanent root.
    pub fn with_namespace(mut self, namespace: impl Into<Namespace>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Namespace applied under the temp root.
    pub fn with_temp_namespace(mut self, namespace: impl Into<Namespace>) -> Self {
        self.temp_namespace = namespace.into();
        self
    }

    /// Period of the stale-permanent-file sweep.
    pub fn with_stale_clean_interval(mut self, interval: Duration) -> Self {
        self.stale_clean_interval = interval;
        self
    }

    /// Period of the orphaned-temp-file sweep.
    pub fn with_temp_clean_interval(mut self, interval: Duration) -> Self {
        self.temp_clean_interval = interval;
        self
    }

    /// Policy for unparseable files found in cache directories.
    pub fn with_unknown_files(mut self, policy: UnknownFiles) -> Self {
        self.unknown_files = policy;
        self
    }

    /// Emit info-level logs around each cleaner pass.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Validate and freeze into a [`CacheConfig`].
    ///
    /// Resolves both namespaces now; the computed directory roots are fixed
    /// for the lifetime of the cache.
    pub fn build(self) -> Result<CacheConfig, CacheError> {
        validate_name(&self.name)?;

        let root = self.dir.unwrap_or_else(default_cache_root);
        let temp_root = self.temp_dir.unwrap_or_else(|| root.clone());
        let dir = root.join(self.namespace.resolve()?).join(&self.name);
        let temp_dir = temp_root
            .join(self.temp_namespace.resolve()?)
            .join(&self.name);

        Ok(CacheConfig {
            name: self.name,
            dir,
            temp_dir,
            ttl: self.ttl,
            // A zero interval would make tokio's timer panic.
            stale_clean_interval: self.stale_clean_interval.max(Duration::from_millis(1)),
            temp_clean_interval: self.temp_clean_interval.max(Duration::from_millis(1)),
            unknown_files: self.unknown_files,
            verbose: self.verbose,
        })
    }
}

fn validate_name(name: &str) -> Result<(), CacheError> {
    if name.is_empty() || !name.is_ascii() || name.contains('/') {
        return Err(CacheError::BadCacheName(name.to_string()));
    }
    Ok(())
}

fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("filecache")
}

/// Validated, immutable configuration of a named cache.
///
/// `dir` and `temp_dir` are the resolved roots with namespace and cache
/// name already applied.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub name: String,
    pub dir: PathBuf,
    pub temp_dir: PathBuf,
    pub ttl: Duration,
    pub stale_clean_interval: Duration,
    pub temp_clean_interval: Duration,
    pub unknown_files: UnknownFiles,
    pub verbose: bool,
}

impl CacheConfig {
    /// Look up one configuration field by its key name.
    pub fn value_of(&self, key: &str) -> Result<ConfigValue, CacheError> {
        match key {
            "cache" => Ok(ConfigValue::Str(self.name.clone())),
            "dir" => Ok(ConfigValue::Path(self.dir.clone())),
            "temp_dir" => Ok(ConfigValue::Path(self.temp_dir.clone())),
            "ttl" => Ok(ConfigValue::Millis(self.ttl.as_millis() as u64)),
            "stale_clean_interval" => Ok(ConfigValue::Millis(
                self.stale_clean_interval.as_millis() as u64,
            )),
            "temp_clean_interval" => Ok(ConfigValue::Millis(
                self.temp_clean_interval.as_millis() as u64,
            )),
            "unknown_files" => Ok(ConfigValue::Policy(self.unknown_files)),
            "verbose" => Ok(ConfigValue::Bool(self.verbose)),
            _ => Err(CacheError::UnknownConfigKey {
                cache: self.name.clone(),
                key: key.to_string(),
            }),
        }
    }
}

/// A single configuration field, as returned by [`CacheConfig::value_of`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Str(String),
    Path(PathBuf),
    Millis(u64),
    Policy(UnknownFiles),
    Bool(bool),
}
