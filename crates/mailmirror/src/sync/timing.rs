//! Sync timing utilities for cooldown management
//!
//! Pure functions so a periodic timer can decide whether to kick off a sync.

use chrono::{DateTime, Duration, Utc};

/// Longer cooldowns are treated as this long
const MAX_COOLDOWN_SECS: u64 = 365 * 24 * 60 * 60;

/// Check if enough time has elapsed since the last sync to allow a new sync.
///
/// # Arguments
/// * `last_sync_at` - When the last successful sync completed (None if never synced)
/// * `cooldown_secs` - Minimum seconds that must elapse between syncs
pub fn cooldown_elapsed(last_sync_at: Option<DateTime<Utc>>, cooldown_secs: u64) -> bool {
    cooldown_remaining(last_sync_at, cooldown_secs, Utc::now()).is_none()
}

/// Time left in the cooldown window as of `now`, `None` once a sync may run
pub fn cooldown_remaining(
    last_sync_at: Option<DateTime<Utc>>,
    cooldown_secs: u64,
    now: DateTime<Utc>,
) -> Option<Duration> {
    let last = last_sync_at?;
    let cooldown = Duration::seconds(cooldown_secs.min(MAX_COOLDOWN_SECS) as i64);
    let ready_at = last + cooldown;
    (ready_at > now).then(|| ready_at - now)
}
