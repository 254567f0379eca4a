//! Periodic sweep of expired and superseded permanent files.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::CacheConfig;
use crate::store::{remove_file_quiet, PermStore, Removal};

/// Mailbox depth. Requests are hints; overflow drops them and the next
/// periodic sweep covers whatever was lost.
const MAILBOX_CAPACITY: usize = 64;

/// Work offloaded to the stale cleaner by writers and lookups.
#[derive(Debug)]
pub enum StaleRequest {
    /// Sweep one id now.
    Clean(String),
    /// Unlink these paths now.
    RemoveFiles(Vec<PathBuf>),
}

/// Fire-and-forget sender half of the stale cleaner's mailbox.
#[derive(Clone, Debug)]
pub struct StaleMailbox {
    tx: mpsc::Sender<StaleRequest>,
}

impl StaleMailbox {
    /// Hint the cleaner to sweep `id`.
    pub fn schedule_clean(&self, id: impl Into<String>) {
        let _ = self.tx.try_send(StaleRequest::Clean(id.into()));
    }

    /// Hand paths to the cleaner for background unlinking.
    pub fn schedule_removal(&self, paths: Vec<PathBuf>) {
        let _ = self.tx.try_send(StaleRequest::RemoveFiles(paths));
    }
}

/// Background task reclaiming stale permanent files of one cache.
///
/// Cloneable so the supervisor can relaunch it after a panic; the mailbox
/// receiver is shared through a mutex and survives the restart.
#[derive(Clone)]
pub struct StaleCleaner {
    config: Arc<CacheConfig>,
    store: PermStore,
    rx: Arc<Mutex<mpsc::Receiver<StaleRequest>>>,
    shutdown: CancellationToken,
}

impl StaleCleaner {
    pub fn new(config: Arc<CacheConfig>, shutdown: CancellationToken) -> (Self, StaleMailbox) {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let store = PermStore::new(Arc::clone(&config));
        let cleaner = Self {
            config,
            store,
            rx: Arc::new(Mutex::new(rx)),
            shutdown,
        };
        (cleaner, StaleMailbox { tx })
    }

    /// Run until shutdown. The timer re-arms on tick, before the sweep
    /// body, so a slow sweep never stalls the schedule.
    pub async fn run(self) {
        let rx = Arc::clone(&self.rx);
        let mut rx = rx.lock().await;
        let mut ticker = tokio::time::interval(self.config.stale_clean_interval);
        // A sweep that overruns its period skips the missed ticks.
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // Consume the immediate first tick.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                _ = ticker.tick() => self.sweep(),

                request = rx.recv() => match request {
                    Some(request) => self.handle(request),
                    None => break,
                },
            }
        }
    }

    fn sweep(&self) {
        if self.config.verbose {
            info!(
                "FileCache ({}): Starting stale cleanup for {}",
                self.config.name, self.config.name
            );
        }
        if let Err(err) = self.store.find_all(None, &Removal::Sync) {
            warn!(
                "FileCache ({}): stale cleanup failed: {}",
                self.config.name, err
            );
        }
    }

    fn handle(&self, request: StaleRequest) {
        match request {
            StaleRequest::Clean(id) => {
                if let Err(err) = self.store.find_all(Some(id.as_str()), &Removal::Sync) {
                    warn!(
                        "FileCache ({}): cleanup of '{}' failed: {}",
                        self.config.name, id, err
                    );
                }
            }
            StaleRequest::RemoveFiles(paths) => {
                for path in paths {
                    if let Err(err) = remove_file_quiet(&path) {
                        warn!(
                            "FileCache ({}): failed to remove '{}': {}",
                            self.config.name,
                            path.display(),
                            err
                        );
                    }
                }
            }
        }
    }
}
