//! Producer identity tokens and the temp-file liveness oracle.
//!
//! Every in-flight write stages its bytes under a temp filename carrying an
//! [`OwnerToken`]. The token names the producer: the current process (pid
//! plus a per-boot nonce, so a recycled pid from an earlier boot cannot
//! impersonate us) and a per-allocation sequence number. The temp cleaner
//! asks the [`OwnerRegistry`] whether the producer behind a token is still
//! alive; files of dead producers are garbage.

use std::collections::HashSet;
use std::fmt;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);
static PROCESS_NONCE: OnceLock<u64> = OnceLock::new();

/// Per-boot nonce distinguishing this process instance from an earlier one
/// that happened to get the same pid.
fn process_nonce() -> u64 {
    *PROCESS_NONCE.get_or_init(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    })
}

/// Identity of the producer behind a temp file.
///
/// Rendered into filenames as `pid-nonce-seq`. Contains no `$` and no `/`,
/// so it never interferes with filename parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerToken {
    pid: u32,
    nonce: u64,
    seq: u64,
}

impl OwnerToken {
    /// Mint a fresh token for a producer in this process.
    pub fn mint() -> Self {
        Self {
            pid: process::id(),
            nonce: process_nonce(),
            seq: NEXT_SEQ.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Parse a token previously rendered with `Display`.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, '-');
        let pid = parts.next()?.parse().ok()?;
        let nonce = parts.next()?.parse().ok()?;
        let seq = parts.next()?.parse().ok()?;
        Some(Self { pid, nonce, seq })
    }

    /// Whether this token was minted by the current process instance.
    ///
    /// Tokens from earlier instances parse but are not ours to judge; the
    /// temp cleaner routes them through the unknown-files policy instead.
    pub fn is_current_process(&self) -> bool {
        self.pid == process::id() && self.nonce == process_nonce()
    }
}

impl fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.pid, self.nonce, self.seq)
    }
}

/// Liveness oracle for producers owned by one cache.
///
/// A producer is alive exactly while its RAII [`OwnerGuard`] exists. The
/// set is cleared on cache shutdown, after which every remaining temp file
/// is fair game for the cleaner.
#[derive(Clone, Default, Debug)]
pub struct OwnerRegistry {
    live: Arc<Mutex<HashSet<u64>>>,
}

impl OwnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new producer and return its guard.
    pub fn begin(&self) -> OwnerGuard {
        let token = OwnerToken::mint();
        self.live.lock().unwrap().insert(token.seq);
        OwnerGuard {
            registry: self.clone(),
            token,
        }
    }

    /// Whether the producer behind `token` is still alive.
    pub fn is_alive(&self, token: &OwnerToken) -> bool {
        token.is_current_process() && self.live.lock().unwrap().contains(&token.seq)
    }

    /// Drop all registrations. Called on cache shutdown.
    pub fn clear(&self) {
        self.live.lock().unwrap().clear();
    }
}

/// RAII registration of a live producer.
///
/// Deregisters on drop, on every exit path of a write (commit, error,
/// panic), so a completed or failed producer never pins its temp files.
pub struct OwnerGuard {
    registry: OwnerRegistry,
    token: OwnerToken,
}

impl OwnerGuard {
    pub fn token(&self) -> OwnerToken {
        self.token
    }
}

impl Drop for OwnerGuard {
    fn drop(&mut self) {
        self.registry.live.lock().unwrap().remove(&self.token.seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_produces_distinct_tokens() {
        let a = OwnerToken::mint();
        let b = OwnerToken::mint();
        assert_ne!(a, b);
    }

    #[test]
    fn display_round_trips_through_parse() {
        let token = OwnerToken::mint();
        let parsed = OwnerToken::parse(&token.to_string());
        assert_eq!(parsed, Some(token));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(OwnerToken::parse(""), None);
        assert_eq!(OwnerToken::parse("_"), None);
        assert_eq!(OwnerToken::parse("1-2"), None);
        assert_eq!(OwnerToken::parse("a-b-c"), None);
    }

    #[test]
    fn minted_token_is_current_process() {
        assert!(OwnerToken::mint().is_current_process());
    }

    #[test]
    fn foreign_pid_is_not_current_process() {
        let token = OwnerToken::parse("1-1-1").unwrap();
        assert!(!token.is_current_process());
    }

    #[test]
    fn guard_keeps_owner_alive_until_drop() {
        let registry = OwnerRegistry::new();
        let guard = registry.begin();
        let token = guard.token();

        assert!(registry.is_alive(&token));
        drop(guard);
        assert!(!registry.is_alive(&token));
    }

    #[test]
    fn clear_kills_all_owners() {
        let registry = OwnerRegistry::new();
        let guard = registry.begin();
        let token = guard.token();

        registry.clear();
        assert!(!registry.is_alive(&token));
    }

    #[test]
    fn foreign_process_token_is_never_alive() {
        let registry = OwnerRegistry::new();
        let _guard = registry.begin();

        let foreign = OwnerToken::parse("1-1-0").unwrap();
        assert!(!registry.is_alive(&foreign));
    }
}
