//! Sync coordinator
//!
//! Drives one mailbox through refresh, fetch, normalize and persist. Each run
//! is described by a `SyncSession` that records the phases it went through,
//! the stats collected along the way and the terminal error, if any.
//!
//! Re-running a sync with no remote change leaves the mirror as it was:
//! rows are upserted on `(id, owner_email)` and keep their first-seen
//! `created_at`.

use std::time::Instant;

use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;

use super::fetch::{FetchOptions, list_and_fetch};
use super::{CancellationToken, MailboxLocks};
use crate::error::{FetchError, SyncError};
use crate::gmail::{MailProvider, TokenRefresher, normalize_message};
use crate::models::{LabelFilter, MessageId, MessageRecord};
use crate::storage::MailStore;

/// Where a sync is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncPhase {
    Idle,
    Refreshing,
    Fetching,
    Normalizing,
    Persisting,
    Completed,
    Failed,
}

impl SyncPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, SyncPhase::Completed | SyncPhase::Failed)
    }
}

/// Statistics from a sync operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    /// Rows written to the mirror
    pub synced_count: usize,
    /// Distinct message ids listed across the label filter
    pub listed: usize,
    /// Detail fetches that failed and were skipped
    pub failed: usize,
    pub failed_ids: Vec<MessageId>,
    /// Duration of the sync operation
    pub duration_ms: u64,
}

/// Receives progress from a running sync
///
/// Both methods default to no-ops.
pub trait SyncObserver: Send + Sync {
    fn on_phase(&self, _user_id: &str, _phase: SyncPhase) {}

    fn on_fetch_progress(&self, _user_id: &str, _done: usize, _total: usize) {}
}

/// One sync request and everything that happened to it
#[derive(Debug)]
pub struct SyncSession {
    user_id: String,
    labels: LabelFilter,
    cancel: CancellationToken,
    phase: SyncPhase,
    history: Vec<SyncPhase>,
    stats: SyncStats,
    error: Option<SyncError>,
}

impl SyncSession {
    /// New idle session; an absent or empty label list means INBOX
    pub fn new(user_id: impl Into<String>, labels: Option<Vec<String>>) -> Self {
        Self {
            user_id: user_id.into(),
            labels: LabelFilter::from_option(labels),
            cancel: CancellationToken::new(),
            phase: SyncPhase::Idle,
            history: vec![SyncPhase::Idle],
            stats: SyncStats::default(),
            error: None,
        }
    }

    /// Use a caller-held token so the sync can be cancelled from outside
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn labels(&self) -> &LabelFilter {
        &self.labels
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Every phase entered, starting with `Idle`
    pub fn history(&self) -> &[SyncPhase] {
        &self.history
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    pub fn error(&self) -> Option<&SyncError> {
        self.error.as_ref()
    }

    /// Stats on success, the terminal error otherwise
    pub fn into_result(self) -> Result<SyncStats, SyncError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.stats),
        }
    }
}

/// Everything a sync needs, borrowed from the owning service
pub struct SyncCoordinator<'a> {
    pub refresher: &'a dyn TokenRefresher,
    pub provider: &'a dyn MailProvider,
    pub store: &'a dyn MailStore,
    pub locks: &'a MailboxLocks,
    pub options: FetchOptions,
    pub observer: Option<&'a dyn SyncObserver>,
}

impl SyncCoordinator<'_> {
    /// Sync `user_id` for the given labels (INBOX when `None` or empty)
    pub fn sync(&self, user_id: &str, labels: Option<Vec<String>>) -> Result<SyncStats, SyncError> {
        self.run(SyncSession::new(user_id, labels)).into_result()
    }

    /// Drive `session` to a terminal phase and hand it back
    pub fn run(&self, mut session: SyncSession) -> SyncSession {
        let start = Instant::now();
        let result = self.drive(&mut session);
        session.stats.duration_ms =
            u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(()) => {
                self.enter(&mut session, SyncPhase::Completed);
                info!(
                    "Sync for {} completed: {} synced, {} failed in {}ms",
                    session.user_id,
                    session.stats.synced_count,
                    session.stats.failed,
                    session.stats.duration_ms
                );
            }
            Err(err) => {
                warn!("Sync for {} failed: {}", session.user_id, err);
                session.error = Some(err);
                self.enter(&mut session, SyncPhase::Failed);
            }
        }

        session
    }

    fn drive(&self, session: &mut SyncSession) -> Result<(), SyncError> {
        let credential = self
            .store
            .get_credential(&session.user_id)
            .map_err(|e| SyncError::Persistence(e.context("Failed to load mailbox credential")))?
            .ok_or_else(|| SyncError::NoCredential {
                user_id: session.user_id.clone(),
            })?;

        let Some(refresh_token) = credential.usable_refresh_token() else {
            return Err(SyncError::NoCredential {
                user_id: session.user_id.clone(),
            });
        };

        let _guard = self
            .locks
            .try_acquire(&credential.email)
            .ok_or_else(|| SyncError::AlreadyRunning {
                email: credential.email.clone(),
            })?;

        self.enter(session, SyncPhase::Refreshing);
        let token = self.refresher.refresh(refresh_token).map_err(SyncError::Auth)?;
        if let Err(e) = self.store.update_access_token(&session.user_id, &token) {
            warn!("Failed to persist refreshed token for {}: {:#}", credential.email, e);
        }

        self.enter(session, SyncPhase::Fetching);
        let user_id = session.user_id.clone();
        let on_progress = |done: usize, total: usize| {
            if let Some(observer) = self.observer {
                observer.on_fetch_progress(&user_id, done, total);
            }
        };
        let fetched = list_and_fetch(
            self.provider,
            &token,
            &session.labels,
            &self.options,
            &session.cancel,
            &on_progress,
        )
        .map_err(|e| match e {
            FetchError::Cancelled => SyncError::Cancelled,
            other => SyncError::Fetch(other),
        })?;

        session.stats.listed = fetched.listed;
        session.stats.failed = fetched.failed.len();
        session.stats.failed_ids = fetched.failed;

        self.enter(session, SyncPhase::Normalizing);
        let synced_at = Utc::now();
        let records: Vec<MessageRecord> = fetched
            .messages
            .iter()
            .map(|raw| normalize_message(raw, &credential.email, synced_at))
            .collect();

        if session.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        self.enter(session, SyncPhase::Persisting);
        if records.is_empty() {
            debug!("Nothing to persist for {}", credential.email);
            return Ok(());
        }

        session.stats.synced_count = self
            .store
            .upsert_messages(records)
            .map_err(SyncError::Persistence)?;

        Ok(())
    }

    fn enter(&self, session: &mut SyncSession, phase: SyncPhase) {
        debug!("Sync {} -> {:?}", session.user_id, phase);
        session.phase = phase;
        session.history.push(phase);
        if let Some(observer) = self.observer {
            observer.on_phase(&session.user_id, phase);
        }
    }
}
