//! Mailbox service
//!
//! Owns the refresher, provider, store and sync bookkeeping, and exposes the
//! operations a UI needs: sync, mutations, queries and credential
//! registration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::actions::{Ack, ActionHandler, MailAction};
use crate::config::SyncSettings;
use crate::error::{MutationError, SyncError};
use crate::gmail::{MailProvider, OutgoingMessage, TokenRefresher};
use crate::models::{AccessToken, MailboxCredential, MessageId, MessageRecord};
use crate::query::{self, MessageQuery, MessageSummary};
use crate::storage::{MailStore, MessageStore};
use crate::sync::{
    FetchOptions, MailboxLocks, SyncCoordinator, SyncObserver, SyncSession, SyncStats,
    cooldown_elapsed,
};

/// Entry point for hosts: one per process, shared across threads
pub struct MailboxService {
    refresher: Arc<dyn TokenRefresher>,
    provider: Arc<dyn MailProvider>,
    store: Arc<dyn MailStore>,
    messages: Arc<dyn MessageStore>,
    actions: ActionHandler,
    locks: MailboxLocks,
    settings: SyncSettings,
    observer: Option<Arc<dyn SyncObserver>>,
    /// user_id -> completion time of the last successful sync
    last_sync: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl MailboxService {
    pub fn new<S>(
        refresher: Arc<dyn TokenRefresher>,
        provider: Arc<dyn MailProvider>,
        store: Arc<S>,
        settings: SyncSettings,
    ) -> Self
    where
        S: MailStore + 'static,
    {
        let messages: Arc<dyn MessageStore> = store.clone();
        Self {
            actions: ActionHandler::new(provider.clone(), messages.clone()),
            refresher,
            provider,
            store,
            messages,
            locks: MailboxLocks::new(),
            settings,
            observer: None,
            last_sync: Mutex::new(HashMap::new()),
        }
    }

    /// Receive phase and progress notifications for every sync
    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    fn coordinator<'a>(&'a self, observer: Option<&'a dyn SyncObserver>) -> SyncCoordinator<'a> {
        SyncCoordinator {
            refresher: self.refresher.as_ref(),
            provider: self.provider.as_ref(),
            store: self.store.as_ref(),
            locks: &self.locks,
            options: FetchOptions::from(&self.settings),
            observer: observer.or(self.observer.as_deref()),
        }
    }

    // ========================================================================
    // Sync
    // ========================================================================

    /// Sync a mailbox for the given labels (INBOX when `None` or empty)
    pub fn sync(&self, user_id: &str, labels: Option<Vec<String>>) -> Result<SyncStats, SyncError> {
        self.run_session(SyncSession::new(user_id, labels)).into_result()
    }

    /// Run a caller-built session, e.g. one holding a cancellation token
    pub fn run_session(&self, session: SyncSession) -> SyncSession {
        self.run_with(session, None)
    }

    /// Like `run_session`, reporting to `observer` instead of the service-wide one
    pub fn run_session_observed(
        &self,
        session: SyncSession,
        observer: &dyn SyncObserver,
    ) -> SyncSession {
        self.run_with(session, Some(observer))
    }

    fn run_with(&self, session: SyncSession, observer: Option<&dyn SyncObserver>) -> SyncSession {
        let session = self.coordinator(observer).run(session);
        if session.error().is_none() {
            self.last_sync
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(session.user_id().to_string(), Utc::now());
        }
        session
    }

    /// Sync unless the last successful sync is inside the cooldown window
    ///
    /// Returns `Ok(None)` when skipped.
    pub fn sync_if_due(
        &self,
        user_id: &str,
        labels: Option<Vec<String>>,
    ) -> Result<Option<SyncStats>, SyncError> {
        if !cooldown_elapsed(self.last_sync_at(user_id), self.settings.sync_cooldown_secs) {
            debug!("Skipping sync for {}: cooldown not elapsed", user_id);
            return Ok(None);
        }
        self.sync(user_id, labels).map(Some)
    }

    /// When the last successful sync for `user_id` finished
    pub fn last_sync_at(&self, user_id: &str) -> Option<DateTime<Utc>> {
        self.last_sync
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(user_id)
            .copied()
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Refresh the user's token and apply a mutation to their mailbox
    pub fn apply_action(&self, user_id: &str, action: MailAction) -> Result<Ack, MutationError> {
        let (credential, token) = self.authorize(user_id)?;
        self.actions.apply(&token, &credential.email, action)
    }

    /// Send a message from the user's mailbox
    pub fn send_message(
        &self,
        user_id: &str,
        message: OutgoingMessage,
    ) -> Result<Ack, MutationError> {
        self.apply_action(user_id, MailAction::Send(message))
    }

    fn authorize(&self, user_id: &str) -> Result<(MailboxCredential, AccessToken), MutationError> {
        let credential = self
            .store
            .get_credential(user_id)
            .map_err(MutationError::Store)?
            .ok_or_else(|| MutationError::NoCredential {
                user_id: user_id.to_string(),
            })?;

        let refresh_token = credential
            .usable_refresh_token()
            .ok_or_else(|| MutationError::NoCredential {
                user_id: user_id.to_string(),
            })?;

        let token = self
            .refresher
            .refresh(refresh_token)
            .map_err(MutationError::Auth)?;

        if let Err(e) = self.store.update_access_token(user_id, &token) {
            warn!("Failed to persist refreshed token for {}: {:#}", credential.email, e);
        }

        Ok((credential, token))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// List mirrored messages, newest first
    pub fn list_messages(&self, query: &MessageQuery) -> Result<Vec<MessageSummary>> {
        query::list_messages(self.messages.as_ref(), query)
    }

    /// Get one mirrored message with its body
    pub fn get_message(&self, owner_email: &str, id: &MessageId) -> Result<Option<MessageRecord>> {
        query::get_message_detail(self.messages.as_ref(), owner_email, id)
    }

    /// Count unread messages, optionally within one label
    pub fn count_unread(&self, owner_email: &str, label: Option<&str>) -> Result<usize> {
        query::count_unread(self.messages.as_ref(), owner_email, label)
    }

    // ========================================================================
    // Credentials
    // ========================================================================

    /// Register the result of an OAuth consent for `user_id`
    pub fn save_credential(
        &self,
        user_id: &str,
        email: &str,
        access_token: Option<String>,
        refresh_token: Option<String>,
    ) -> Result<()> {
        let mut credential = MailboxCredential::new(user_id, email);
        credential.access_token = access_token;
        credential.refresh_token = refresh_token;
        self.store.save_credential(credential)
    }

    /// Look up the stored credential for `user_id`
    pub fn credential(&self, user_id: &str) -> Result<Option<MailboxCredential>> {
        self.store.get_credential(user_id)
    }
}
