//! MailMirror facade for UniFFI export
//!
//! This provides a high-level, FFI-friendly API that wraps the mailbox
//! service with the real Gmail transport and SQLite store.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::warn;

use crate::actions::MailAction;
use crate::config::{GmailCredentials, SyncSettings};
use crate::ffi::types::*;
use crate::gmail::{GmailAuth, GmailClient};
use crate::models::MessageId;
use crate::query::MessageQuery;
use crate::service::MailboxService;
use crate::storage::SqliteMailStore;
use crate::sync::{CancellationToken, SyncSession};

/// Main service object for mailbox operations
///
/// This is the primary entry point for Swift/Kotlin code. One instance is
/// shared across threads; syncs for different users may run concurrently.
#[derive(uniffi::Object)]
pub struct MailMirror {
    service: MailboxService,
    /// user_id -> cancellation token of the sync in flight
    active: Mutex<HashMap<String, CancellationToken>>,
}

impl MailMirror {
    fn open(db_path: &str, credentials: GmailCredentials) -> Result<Arc<Self>, MailError> {
        // Ensure parent directories exist
        if let Some(parent) = PathBuf::from(db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| MailError::Database {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let settings = SyncSettings::load().unwrap_or_else(|e| {
            warn!("Falling back to default sync settings: {:#}", e);
            SyncSettings::default()
        });

        let store = SqliteMailStore::new(db_path).map_err(|e| MailError::Database {
            message: format!("Failed to open database: {:#}", e),
        })?;

        let timeout = settings.request_timeout();
        let service = MailboxService::new(
            Arc::new(GmailAuth::new(&credentials, timeout)),
            Arc::new(GmailClient::new(timeout)),
            Arc::new(store),
            settings,
        );

        Ok(Arc::new(Self {
            service,
            active: Mutex::new(HashMap::new()),
        }))
    }

    fn user_email(&self, user_id: &str) -> Result<String, MailError> {
        self.service
            .credential(user_id)?
            .map(|c| c.email)
            .ok_or_else(|| MailError::AuthRequired {
                message: format!("No mailbox credential for user {}", user_id),
            })
    }

    fn apply(&self, user_id: &str, action: MailAction) -> Result<FfiAck, MailError> {
        Ok(self.service.apply_action(user_id, action)?.into())
    }

    /// Register the cancel token of a sync about to start for `user_id`
    ///
    /// Fails with `Busy` while an earlier sync for the same user is in flight,
    /// leaving that sync's token in place.
    fn begin_sync(&self, user_id: &str) -> Result<CancellationToken, MailError> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.contains_key(user_id) {
            let cancel = CancellationToken::new();
            active.insert(user_id.to_string(), cancel.clone());
            return Ok(cancel);
        }
        drop(active);

        let email = self
            .user_email(user_id)
            .unwrap_or_else(|_| user_id.to_string());
        Err(MailError::Busy { email })
    }

    /// Forget `cancel` if it is still the token registered for `user_id`
    fn end_sync(&self, user_id: &str, cancel: &CancellationToken) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.get(user_id).is_some_and(|t| t.same_as(cancel)) {
            active.remove(user_id);
        }
    }
}

#[uniffi::export]
impl MailMirror {
    /// Create a MailMirror with explicit OAuth client credentials
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    /// * `client_id` - Google OAuth client id
    /// * `client_secret` - Google OAuth client secret
    #[uniffi::constructor]
    pub fn new(
        db_path: String,
        client_id: String,
        client_secret: String,
    ) -> Result<Arc<Self>, MailError> {
        Self::open(
            &db_path,
            GmailCredentials {
                client_id,
                client_secret,
            },
        )
    }

    /// Create a MailMirror using credentials from the build, the config
    /// directory or the environment
    #[uniffi::constructor]
    pub fn from_config(db_path: String) -> Result<Arc<Self>, MailError> {
        let credentials = GmailCredentials::load().map_err(|e| MailError::InvalidArgument {
            message: format!("{:#}", e),
        })?;
        Self::open(&db_path, credentials)
    }

    // ========================================================================
    // Credentials
    // ========================================================================

    /// Store the tokens obtained from an OAuth consent
    pub fn save_credential(
        &self,
        user_id: String,
        email: String,
        access_token: Option<String>,
        refresh_token: Option<String>,
    ) -> Result<(), MailError> {
        self.service
            .save_credential(&user_id, &email, access_token, refresh_token)?;
        Ok(())
    }

    // ========================================================================
    // Sync
    // ========================================================================

    /// Sync a user's mailbox
    ///
    /// # Arguments
    /// * `user_id` - The user whose credential is used
    /// * `labels` - Labels to mirror; INBOX when empty
    /// * `callback` - Phase and progress updates for UI
    pub fn sync_mailbox(
        &self,
        user_id: String,
        labels: Vec<String>,
        callback: Box<dyn SyncProgressCallback>,
    ) -> Result<FfiSyncStats, MailError> {
        let cancel = self.begin_sync(&user_id)?;

        let observer = CallbackObserver(callback);
        let session = SyncSession::new(&user_id, Some(labels)).with_cancellation(cancel.clone());
        let session = self.service.run_session_observed(session, &observer);

        self.end_sync(&user_id, &cancel);

        Ok(session.into_result()?.into())
    }

    /// Sync unless the last successful sync is inside the cooldown window
    ///
    /// Returns `None` when skipped.
    pub fn sync_if_due(
        &self,
        user_id: String,
        labels: Vec<String>,
    ) -> Result<Option<FfiSyncStats>, MailError> {
        let stats = self.service.sync_if_due(&user_id, Some(labels))?;
        Ok(stats.map(FfiSyncStats::from))
    }

    /// Ask the running `sync_mailbox` for `user_id` to stop
    ///
    /// Returns false when no sync is in flight. Nothing is persisted by a
    /// cancelled sync.
    pub fn cancel_sync(&self, user_id: String) -> bool {
        match self
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&user_id)
        {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Move a message to the trash
    pub fn delete_message(
        &self,
        user_id: String,
        message_id: String,
    ) -> Result<FfiAck, MailError> {
        self.apply(&user_id, MailAction::Delete(MessageId::new(message_id)))
    }

    /// Move a message out of the trash back to the inbox
    pub fn restore_message(
        &self,
        user_id: String,
        message_id: String,
    ) -> Result<FfiAck, MailError> {
        self.apply(&user_id, MailAction::Restore(MessageId::new(message_id)))
    }

    /// Delete a message for good, remotely and locally
    pub fn permanently_delete_message(
        &self,
        user_id: String,
        message_id: String,
    ) -> Result<FfiAck, MailError> {
        self.apply(
            &user_id,
            MailAction::PermanentDelete(MessageId::new(message_id)),
        )
    }

    /// Send a message and file it under SENT locally
    pub fn send_message(
        &self,
        user_id: String,
        message: FfiOutgoingMessage,
    ) -> Result<FfiAck, MailError> {
        Ok(self.service.send_message(&user_id, message.into())?.into())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// List mirrored messages, newest first
    ///
    /// A `limit` of 0 uses the default page size.
    pub fn list_messages(
        &self,
        user_id: String,
        label: Option<String>,
        search: Option<String>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<FfiMessageSummary>, MailError> {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let mut query = MessageQuery::new(self.user_email(&user_id)?).page(limit, offset);
        query.label = label;
        query.search = search;

        let messages = self.service.list_messages(&query)?;
        Ok(messages.into_iter().map(FfiMessageSummary::from).collect())
    }

    /// Get one mirrored message with its body
    pub fn get_message(
        &self,
        user_id: String,
        message_id: String,
    ) -> Result<Option<FfiMessage>, MailError> {
        let email = self.user_email(&user_id)?;
        let message = self
            .service
            .get_message(&email, &MessageId::new(message_id))?;
        Ok(message.map(FfiMessage::from))
    }

    /// Count unread messages, optionally within one label
    pub fn count_unread(&self, user_id: String, label: Option<String>) -> Result<u32, MailError> {
        let email = self.user_email(&user_id)?;
        let unread = self.service.count_unread(&email, label.as_deref())?;
        Ok(u32::try_from(unread).unwrap_or(u32::MAX))
    }
}
