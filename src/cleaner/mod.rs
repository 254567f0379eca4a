//! Background reclamation tasks.
//!
//! Each named cache runs two periodic tasks: the stale cleaner sweeps
//! expired and superseded permanent files, the temp cleaner sweeps staging
//! files whose producer is gone. Neither ever blocks a live writer; writers
//! talk to the stale cleaner only through its fire-and-forget mailbox.

mod stale;
mod temp;

pub use stale::{StaleCleaner, StaleMailbox, StaleRequest};
pub use temp::TempCleaner;
