//! Periodic sweep of orphaned temp files.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::owner::OwnerRegistry;
use crate::store::{apply_unknown_policy, remove_file_quiet, TempStore};

/// Background task reclaiming staging files whose producer is gone.
///
/// A temp file is preserved exactly while its owner token answers alive in
/// the registry. Tokens minted by another process instance cannot be
/// judged here; they go through the unknown-files policy.
#[derive(Clone)]
pub struct TempCleaner {
    config: Arc<CacheConfig>,
    store: TempStore,
    owners: OwnerRegistry,
    shutdown: CancellationToken,
}

impl TempCleaner {
    pub fn new(config: Arc<CacheConfig>, owners: OwnerRegistry, shutdown: CancellationToken) -> Self {
        let store = TempStore::new(Arc::clone(&config));
        Self {
            config,
            store,
            owners,
            shutdown,
        }
    }

    /// Run until shutdown. The timer re-arms on tick, before the sweep
    /// body.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.config.temp_clean_interval);
        // A sweep that overruns its period skips the missed ticks.
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // Consume the immediate first tick.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                _ = ticker.tick() => self.sweep(),
            }
        }
    }

    fn sweep(&self) {
        if self.config.verbose {
            info!(
                "FileCache ({}): Starting temp cleanup for {}",
                self.config.name, self.config.name
            );
        }
        let matches = match self.store.enumerate() {
            Ok(matches) => matches,
            Err(err) => {
                warn!(
                    "FileCache ({}): temp cleanup failed: {}",
                    self.config.name, err
                );
                return;
            }
        };
        for matched in matches {
            let parsed = match self.store.parse_filepath(&matched) {
                Ok(parsed) => parsed,
                Err(err) => {
                    apply_unknown_policy(&self.config, &matched, &err);
                    continue;
                }
            };
            if !parsed.owner.is_current_process() {
                apply_unknown_policy(
                    &self.config,
                    &matched,
                    &"owner token minted by another process instance",
                );
                continue;
            }
            if self.owners.is_alive(&parsed.owner) {
                continue;
            }
            debug!(
                "FileCache ({}): removing orphaned temp file '{}'",
                self.config.name,
                matched.display()
            );
            if let Err(err) = remove_file_quiet(&matched) {
                warn!(
                    "FileCache ({}): failed to remove '{}': {}",
                    self.config.name,
                    matched.display(),
                    err
                );
            }
        }
    }
}
