//! Sync engine for fetching and storing mail
//!
//! Provides idempotent sync operations that can be safely retried.

mod control;
mod coordinator;
mod fetch;
mod timing;

pub use control::{CancellationToken, MailboxGuard, MailboxLocks};
pub use coordinator::{SyncCoordinator, SyncObserver, SyncPhase, SyncSession, SyncStats};
pub use fetch::{FetchOptions, FetchOutcome, list_and_fetch};
pub use timing::{cooldown_elapsed, cooldown_remaining};
