//! Time helpers for expiration timestamps.
//!
//! Expirations are stored in filenames as signed milliseconds since the
//! Unix epoch, so everything here works in `i64` milliseconds.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn epoch_millis() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_millis() as i64,
        // Clock before the epoch; render as a negative offset.
        Err(err) => -(err.duration().as_millis() as i64),
    }
}

/// Expiration timestamp for an entry written now with the given TTL.
pub fn expires_at(ttl: Duration) -> i64 {
    epoch_millis().saturating_add(ttl.as_millis() as i64)
}
