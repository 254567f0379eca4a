//! Cache lifecycle and client operations.
//!
//! [`FileCache::start`] validates the options, publishes the config,
//! creates the directories, and launches the two cleaners as supervised
//! background tasks. The handle is cheap to clone and every operation runs
//! on the caller's thread; the filesystem provides the only mutual
//! exclusion, so no operation ever blocks waiting on another client.

use std::fs;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::cleaner::{StaleCleaner, StaleMailbox, TempCleaner};
use crate::config::{CacheConfig, CacheOptions};
use crate::error::CacheError;
use crate::owner::OwnerRegistry;
use crate::producer::Producer;
use crate::registry;
use crate::store::{remove_file_quiet, PermStore, Removal, TempStore};
use crate::stream::CacheReader;

/// Per-operation options for writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Override of the cache's default TTL.
    pub ttl: Option<Duration>,
}

impl WriteOptions {
    /// Options with a TTL override.
    pub fn ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }
}

/// A resolved entry plus its metadata.
#[derive(Debug)]
pub struct CacheRecord {
    pub id: String,
    pub path: PathBuf,
    /// Milliseconds since the Unix epoch at which the entry goes stale.
    pub expires_at: i64,
    /// Time left until then, zero if already due.
    pub ttl_remaining: Duration,
    pub stream: CacheReader,
}

/// Counts of files currently on disk for one cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Parseable permanent files, expired generations included.
    pub current: usize,
    /// Parseable temp files, in-flight writes included.
    pub in_progress: usize,
}

#[derive(Debug)]
struct Inner {
    name: String,
    perm: PermStore,
    temp: TempStore,
    owners: OwnerRegistry,
    stale: StaleMailbox,
    shutdown: CancellationToken,
}

/// Handle to a running named cache.
///
/// Ids are non-empty strings without `/`. Ids containing the `$` separator
/// are accepted (parsing splits with a bounded part count), but an id that
/// is the `$`-suffix of another id shares its wildcard; `delete` filters on
/// exact parsed ids, so the overlap costs an extra directory scan, nothing
/// more.
#[derive(Clone, Debug)]
pub struct FileCache {
    inner: Arc<Inner>,
}

impl FileCache {
    /// Start a named cache: validate, publish its config, create its
    /// directories, and launch its cleaners.
    ///
    /// Must be called within a tokio runtime; the cleaners are supervised
    /// tasks with one-for-one restart on panic. Starting a second cache
    /// under the same name republishes the config.
    pub fn start(options: CacheOptions) -> Result<FileCache, CacheError> {
        let config = options.build()?;
        let runtime = Handle::try_current().map_err(|_| {
            CacheError::Runtime("FileCache::start requires a running tokio runtime".to_string())
        })?;

        let config = registry::store(config);
        let perm = PermStore::new(Arc::clone(&config));
        let temp = TempStore::new(Arc::clone(&config));
        temp.setup()?;
        perm.setup()?;

        let shutdown = CancellationToken::new();
        let owners = OwnerRegistry::new();
        let (stale_cleaner, stale) = StaleCleaner::new(Arc::clone(&config), shutdown.child_token());
        let temp_cleaner = TempCleaner::new(
            Arc::clone(&config),
            owners.clone(),
            shutdown.child_token(),
        );

        spawn_supervised(&runtime, "stale cleaner", &config.name, shutdown.clone(), {
            move || stale_cleaner.clone().run()
        });
        spawn_supervised(&runtime, "temp cleaner", &config.name, shutdown.clone(), {
            move || temp_cleaner.clone().run()
        });

        Ok(FileCache {
            inner: Arc::new(Inner {
                name: config.name.clone(),
                perm,
                temp,
                owners,
                stale,
                shutdown,
            }),
        })
    }

    /// Name of this cache.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// This cache's published configuration.
    pub fn config(&self) -> Result<Arc<CacheConfig>, CacheError> {
        registry::get(&self.inner.name)
    }

    /// Unconditionally write `producer`'s bytes under `id`.
    ///
    /// Returns a lazy reader over the committed file.
    pub fn put(&self, id: &str, producer: impl Into<Producer>) -> Result<CacheReader, CacheError> {
        self.put_with(id, producer, WriteOptions::default())
    }

    /// As [`put`](Self::put), with per-operation options.
    pub fn put_with(
        &self,
        id: &str,
        producer: impl Into<Producer>,
        opts: WriteOptions,
    ) -> Result<CacheReader, CacheError> {
        self.write(id, producer.into(), opts, true)
    }

    /// Read-through: return the valid entry for `id` if one exists,
    /// otherwise run the producer and commit its bytes.
    ///
    /// The producer is not touched on a hit, so thunks make the miss path
    /// pay-per-use.
    pub fn execute(
        &self,
        id: &str,
        producer: impl Into<Producer>,
    ) -> Result<CacheReader, CacheError> {
        self.execute_with(id, producer, WriteOptions::default())
    }

    /// As [`execute`](Self::execute), with per-operation options.
    pub fn execute_with(
        &self,
        id: &str,
        producer: impl Into<Producer>,
        opts: WriteOptions,
    ) -> Result<CacheReader, CacheError> {
        validate_id(id)?;
        if let Some(entry) = self.inner.perm.find(id, &self.deferred())? {
            return Ok(CacheReader::new(entry.path));
        }
        // The lookup above already swept this id.
        self.write(id, producer.into(), opts, false)
    }

    /// The freshest valid entry for `id`, as a lazy reader.
    pub fn get(&self, id: &str) -> Result<Option<CacheReader>, CacheError> {
        validate_id(id)?;
        let entry = self.inner.perm.find(id, &self.deferred())?;
        Ok(entry.map(|entry| CacheReader::new(entry.path)))
    }

    /// As [`get`](Self::get), with entry metadata.
    pub fn get_record(&self, id: &str) -> Result<Option<CacheRecord>, CacheError> {
        validate_id(id)?;
        let entry = self.inner.perm.find(id, &self.deferred())?;
        Ok(entry.map(|entry| CacheRecord {
            ttl_remaining: entry.ttl_remaining(),
            stream: CacheReader::new(entry.path.clone()),
            id: entry.id,
            path: entry.path,
            expires_at: entry.expires_at,
        }))
    }

    /// Whether a valid entry for `id` exists.
    pub fn exists(&self, id: &str) -> Result<bool, CacheError> {
        validate_id(id)?;
        Ok(self.inner.perm.find(id, &self.deferred())?.is_some())
    }

    /// Synchronously remove every generation of `id`.
    ///
    /// Does not interrupt in-flight producers: a writer that commits after
    /// this returns republishes the id.
    pub fn delete(&self, id: &str) -> Result<(), CacheError> {
        validate_id(id)?;
        self.inner.perm.delete(id)
    }

    /// Remove every permanent file of this cache, expired or not.
    pub fn clean(&self) -> Result<(), CacheError> {
        self.inner.perm.clear()
    }

    /// Counts of permanent and temp files currently on disk.
    pub fn stats(&self) -> Result<Stats, CacheError> {
        Ok(Stats {
            current: self.inner.perm.count()?,
            in_progress: self.inner.temp.count()?,
        })
    }

    /// Stop the cleaners. In-flight writers are not interrupted; their
    /// staging files are removed on their own failure paths or swept later.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.owners.clear();
    }

    fn deferred(&self) -> Removal {
        Removal::Deferred(self.inner.stale.clone())
    }

    fn write(
        &self,
        id: &str,
        producer: Producer,
        opts: WriteOptions,
        preclean: bool,
    ) -> Result<CacheReader, CacheError> {
        validate_id(id)?;
        // Re-read the published config; fails if the cache is not started.
        let _config = self.config()?;

        if preclean {
            self.inner.stale.schedule_clean(id);
        }

        let owner = self.inner.owners.begin();
        let temp_path = self.inner.temp.file_path(id, &owner.token());
        // Expiration is fixed now, at the start of the write, not at commit.
        let perm_path = self.inner.perm.file_path(id, opts.ttl);

        if let Err(err) = write_chunks(&temp_path, producer) {
            let _ = remove_file_quiet(&temp_path);
            return Err(err);
        }
        if let Err(source) = fs::rename(&temp_path, &perm_path) {
            let _ = remove_file_quiet(&temp_path);
            return Err(CacheError::RenameFailed {
                from: temp_path,
                to: perm_path,
                source,
            });
        }

        // Reclaim the superseded generation promptly.
        self.inner.stale.schedule_clean(id);
        Ok(CacheReader::new(perm_path))
    }
}

fn validate_id(id: &str) -> Result<(), CacheError> {
    if id.is_empty() || id.contains('/') {
        return Err(CacheError::BadId(id.to_string()));
    }
    Ok(())
}

/// Stream the producer's chunks into the staging file.
fn write_chunks(path: &Path, producer: Producer) -> Result<(), CacheError> {
    let mut file = fs::File::create(path)?;
    for chunk in producer.into_chunks() {
        let chunk = chunk.map_err(CacheError::Producer)?;
        file.write_all(&chunk)?;
    }
    Ok(())
}

/// Launch a cleaner with one-for-one restart: a panic relaunches only this
/// task, a clean exit (shutdown) ends supervision.
fn spawn_supervised<F, Fut>(
    runtime: &Handle,
    task: &'static str,
    cache: &str,
    shutdown: CancellationToken,
    factory: F,
) where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let cache = cache.to_string();
    runtime.spawn(async move {
        loop {
            match tokio::spawn(factory()).await {
                Ok(()) => break,
                Err(err) if err.is_panic() && !shutdown.is_cancelled() => {
                    error!("FileCache ({}): {} panicked; restarting", cache, task);
                }
                Err(_) => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnknownFiles;
    use bytes::Bytes;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn start_cache(name: &str, dir: &TempDir) -> FileCache {
        FileCache::start(
            CacheOptions::new(name)
                .with_dir(dir.path())
                .with_ttl(Duration::from_secs(3600))
                .with_stale_clean_interval(Duration::from_secs(3600))
                .with_temp_clean_interval(Duration::from_secs(3600)),
        )
        .unwrap()
    }

    #[test]
    fn start_outside_runtime_fails() {
        let dir = TempDir::new().unwrap();
        let err = FileCache::start(CacheOptions::new("svc-no-rt").with_dir(dir.path()))
            .unwrap_err();
        assert!(matches!(err, CacheError::Runtime(_)));
    }

    #[tokio::test]
    async fn start_creates_directories() {
        let dir = TempDir::new().unwrap();
        let cache = start_cache("svc-dirs", &dir);

        let config = cache.config().unwrap();
        assert!(config.dir.is_dir());
        assert!(config.temp_dir.is_dir());
        cache.shutdown();
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let cache = start_cache("svc-round-trip", &dir);

        let written = cache.put("k", "hello").unwrap().bytes().unwrap();
        assert_eq!(&written[..], b"hello");

        let read = cache.get("k").unwrap().unwrap().bytes().unwrap();
        assert_eq!(&read[..], b"hello");
        cache.shutdown();
    }

    #[tokio::test]
    async fn get_miss_is_none() {
        let dir = TempDir::new().unwrap();
        let cache = start_cache("svc-miss", &dir);

        assert!(cache.get("absent").unwrap().is_none());
        cache.shutdown();
    }

    #[tokio::test]
    async fn every_producer_shape_round_trips() {
        let dir = TempDir::new().unwrap();
        let cache = start_cache("svc-shapes", &dir);

        cache.put("raw", b"raw".as_slice()).unwrap();
        cache
            .put("chunks", vec![b"ch".to_vec(), b"unks".to_vec()])
            .unwrap();
        cache
            .put(
                "stream",
                Producer::stream(vec![Ok(Bytes::from_static(b"str")), Ok(Bytes::from_static(b"eam"))]),
            )
            .unwrap();
        cache
            .put("thunk", Producer::thunk(|| Producer::from("thunk")))
            .unwrap();

        for (id, expected) in [
            ("raw", &b"raw"[..]),
            ("chunks", b"chunks"),
            ("stream", b"stream"),
            ("thunk", b"thunk"),
        ] {
            let read = cache.get(id).unwrap().unwrap().bytes().unwrap();
            assert_eq!(&read[..], expected, "id {id}");
        }
        cache.shutdown();
    }

    #[tokio::test]
    async fn execute_skips_producer_on_hit() {
        let dir = TempDir::new().unwrap();
        let cache = start_cache("svc-execute", &dir);
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let produced = cache
                .execute(
                    "k",
                    Producer::thunk(move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Producer::from("produced")
                    }),
                )
                .unwrap()
                .bytes()
                .unwrap();
            assert_eq!(&produced[..], b"produced");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        cache.shutdown();
    }

    #[tokio::test]
    async fn get_record_carries_metadata() {
        let dir = TempDir::new().unwrap();
        let cache = start_cache("svc-record", &dir);
        cache
            .put_with("k", "v", WriteOptions::ttl(Duration::from_secs(60)))
            .unwrap();

        let record = cache.get_record("k").unwrap().unwrap();
        assert_eq!(record.id, "k");
        assert!(record.ttl_remaining > Duration::from_secs(55));
        assert!(record.ttl_remaining <= Duration::from_secs(60));
        assert_eq!(&record.stream.bytes().unwrap()[..], b"v");
        cache.shutdown();
    }

    #[tokio::test]
    async fn exists_reflects_lifecycle() {
        let dir = TempDir::new().unwrap();
        let cache = start_cache("svc-exists", &dir);

        assert!(!cache.exists("k").unwrap());
        cache.put("k", "v").unwrap();
        assert!(cache.exists("k").unwrap());
        cache.delete("k").unwrap();
        assert!(!cache.exists("k").unwrap());
        cache.shutdown();
    }

    #[tokio::test]
    async fn delete_then_get_is_none() {
        let dir = TempDir::new().unwrap();
        let cache = start_cache("svc-delete", &dir);
        cache.put("k", "v").unwrap();

        cache.delete("k").unwrap();
        assert!(cache.get("k").unwrap().is_none());
        // Idempotent.
        cache.delete("k").unwrap();
        cache.shutdown();
    }

    #[tokio::test]
    async fn clean_removes_all_entries() {
        let dir = TempDir::new().unwrap();
        let cache = start_cache("svc-clean", &dir);
        cache.put("a", "1").unwrap();
        cache.put("b", "2").unwrap();

        cache.clean().unwrap();
        assert_eq!(cache.stats().unwrap().current, 0);
        assert!(cache.get("a").unwrap().is_none());
        // Idempotent.
        cache.clean().unwrap();
        cache.shutdown();
    }

    #[tokio::test]
    async fn stats_counts_both_stores() {
        let dir = TempDir::new().unwrap();
        let cache = start_cache("svc-stats", &dir);
        cache.put("a", "1").unwrap();
        cache.put("b", "2").unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.current, 2);
        assert_eq!(stats.in_progress, 0);
        cache.shutdown();
    }

    #[tokio::test]
    async fn producer_failure_leaves_no_files() {
        let dir = TempDir::new().unwrap();
        let cache = start_cache("svc-explode", &dir);

        let err = cache
            .put(
                "k",
                Producer::stream(vec![
                    Ok(Bytes::from_static(b"partial")),
                    Err(io::Error::other("explode")),
                ]),
            )
            .unwrap_err();
        assert!(matches!(err, CacheError::Producer(_)));

        assert!(cache.get("k").unwrap().is_none());
        let stats = cache.stats().unwrap();
        assert_eq!(stats.current, 0);
        assert_eq!(stats.in_progress, 0);
        cache.shutdown();
    }

    #[tokio::test]
    async fn bad_ids_are_rejected() {
        let dir = TempDir::new().unwrap();
        let cache = start_cache("svc-bad-id", &dir);

        assert!(matches!(cache.get(""), Err(CacheError::BadId(_))));
        assert!(matches!(cache.put("a/b", "v"), Err(CacheError::BadId(_))));
        assert!(matches!(cache.delete("x/"), Err(CacheError::BadId(_))));
        cache.shutdown();
    }

    #[tokio::test]
    async fn id_with_separator_round_trips() {
        let dir = TempDir::new().unwrap();
        let cache = start_cache("svc-sep-id", &dir);

        cache.put("price$usd", "42").unwrap();
        let read = cache.get("price$usd").unwrap().unwrap().bytes().unwrap();
        assert_eq!(&read[..], b"42");
        cache.shutdown();
    }

    #[tokio::test]
    async fn supersession_keeps_latest_contents() {
        let dir = TempDir::new().unwrap();
        let cache = start_cache("svc-supersede", &dir);

        cache
            .put_with("k", "old", WriteOptions::ttl(Duration::from_secs(100)))
            .unwrap();
        cache
            .put_with("k", "new", WriteOptions::ttl(Duration::from_secs(200)))
            .unwrap();

        let read = cache.get("k").unwrap().unwrap().bytes().unwrap();
        assert_eq!(&read[..], b"new");
        cache.shutdown();
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = start_cache("svc-expired", &dir);

        cache
            .put_with("k", "v", WriteOptions::ttl(Duration::ZERO))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(cache.get("k").unwrap().is_none());
        cache.shutdown();
    }

    #[tokio::test]
    async fn config_is_readable_through_registry() {
        let dir = TempDir::new().unwrap();
        let cache = start_cache("svc-config", &dir);

        let config = cache.config().unwrap();
        assert_eq!(config.name, "svc-config");
        assert_eq!(
            registry::value_of("svc-config", "ttl").unwrap(),
            crate::config::ConfigValue::Millis(3_600_000)
        );
        cache.shutdown();
    }

    #[tokio::test]
    async fn unknown_files_policy_flows_to_lookups() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::start(
            CacheOptions::new("svc-unknown")
                .with_dir(dir.path())
                .with_unknown_files(UnknownFiles::Remove)
                .with_stale_clean_interval(Duration::from_secs(3600))
                .with_temp_clean_interval(Duration::from_secs(3600)),
        )
        .unwrap();

        let config = cache.config().unwrap();
        let stray = config.dir.join("perm-file-cache$_$k");
        fs::write(&stray, b"x").unwrap();

        cache.get("k").unwrap();
        assert!(!stray.exists());
        cache.shutdown();
    }
}
