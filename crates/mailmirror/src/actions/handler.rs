//! Action handler for mailbox mutations
//!
//! Coordinates between the Gmail API and local storage. Every action runs in
//! two steps:
//! 1. Call Gmail to update server state
//! 2. Update local storage to reflect the change
//!
//! If step 1 fails the mirror is left untouched.

use chrono::Utc;
use log::{info, warn};
use std::sync::Arc;

use crate::error::MutationError;
use crate::gmail::api::MessageHandle;
use crate::gmail::{
    MailProvider, NO_SUBJECT, OutgoingMessage, build_raw_message, encode_raw_message,
};
use crate::models::{AccessToken, LabelId, LabelSet, MessageId, MessageRecord};
use crate::storage::MessageStore;

/// Characters of body kept as the snippet of a sent message
const SENT_SNIPPET_CHARS: usize = 200;

/// A single-message mutation
#[derive(Debug, Clone, PartialEq)]
pub enum MailAction {
    /// Move to trash
    Delete(MessageId),
    /// Take out of trash
    Restore(MessageId),
    /// Delete for good, bypassing trash
    PermanentDelete(MessageId),
    Send(OutgoingMessage),
}

impl MailAction {
    /// Short name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            MailAction::Delete(_) => "delete",
            MailAction::Restore(_) => "restore",
            MailAction::PermanentDelete(_) => "permanent delete",
            MailAction::Send(_) => "send",
        }
    }
}

/// Confirmation that an action was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub action: &'static str,
    /// Message acted on, or the id Gmail assigned to a sent message
    pub message_id: MessageId,
    /// Whether a local row was updated, removed or created
    pub mirrored: bool,
}

/// Handler for trash, restore, permanent delete and send
pub struct ActionHandler {
    provider: Arc<dyn MailProvider>,
    store: Arc<dyn MessageStore>,
}

impl ActionHandler {
    /// Create a new action handler
    pub fn new(provider: Arc<dyn MailProvider>, store: Arc<dyn MessageStore>) -> Self {
        Self { provider, store }
    }

    /// Apply `action` to the mailbox owned by `owner_email`
    pub fn apply(
        &self,
        token: &AccessToken,
        owner_email: &str,
        action: MailAction,
    ) -> Result<Ack, MutationError> {
        let owner = owner_email.trim().to_lowercase();
        let name = action.name();

        let ack = match action {
            MailAction::Delete(id) => {
                validate_id(&id)?;
                info!("Trashing message {} for {}", id.as_str(), owner);
                let remote = self
                    .provider
                    .trash_message(token, &id)
                    .map_err(|source| MutationError::Remote { action: name, source })?;
                let mirrored = self
                    .relabel(&owner, &id, &remote, MessageRecord::trashed_labels)
                    .map_err(|source| MutationError::Mirror { action: name, source })?;
                Ack { action: name, message_id: id, mirrored }
            }
            MailAction::Restore(id) => {
                validate_id(&id)?;
                info!("Restoring message {} for {}", id.as_str(), owner);
                let remote = self
                    .provider
                    .untrash_message(token, &id)
                    .map_err(|source| MutationError::Remote { action: name, source })?;
                let mirrored = self
                    .relabel(&owner, &id, &remote, MessageRecord::restored_labels)
                    .map_err(|source| MutationError::Mirror { action: name, source })?;
                Ack { action: name, message_id: id, mirrored }
            }
            MailAction::PermanentDelete(id) => {
                validate_id(&id)?;
                info!("Permanently deleting message {} for {}", id.as_str(), owner);
                self.provider
                    .delete_message(token, &id)
                    .map_err(|source| MutationError::Remote { action: name, source })?;
                let mirrored = self
                    .store
                    .delete_message(&owner, &id)
                    .map_err(|source| MutationError::Mirror { action: name, source })?;
                Ack { action: name, message_id: id, mirrored }
            }
            MailAction::Send(message) => self.send(token, &owner, message)?,
        };

        if !ack.mirrored {
            info!(
                "No local row for {} {}; nothing to mirror",
                ack.action,
                ack.message_id.as_str()
            );
        }
        Ok(ack)
    }

    /// Send a message and mirror it as a SENT row
    pub fn send(
        &self,
        token: &AccessToken,
        owner_email: &str,
        message: OutgoingMessage,
    ) -> Result<Ack, MutationError> {
        const ACTION: &str = "send";

        if message.to.trim().is_empty() {
            return Err(MutationError::InvalidArgument(
                "recipient must not be empty".to_string(),
            ));
        }

        let owner = owner_email.trim().to_lowercase();
        let raw = encode_raw_message(&build_raw_message(&owner, &message));
        let sent = self
            .provider
            .send_message(token, &raw)
            .map_err(|source| MutationError::Remote { action: ACTION, source })?;
        info!("Sent message {} from {}", sent.id, owner);

        let labels = self.file_as_sent(token, &sent);

        let mut record = MessageRecord::new(sent.id.as_str(), &owner);
        record.subject = if message.subject.trim().is_empty() {
            NO_SUBJECT.to_string()
        } else {
            message.subject.clone()
        };
        record.sender = owner.clone();
        record.snippet = snippet_of(&message.body);
        record.body = message.body;
        record.labels = labels;
        record.created_at = Utc::now();

        self.store
            .upsert_messages(vec![record])
            .map_err(|source| MutationError::Mirror { action: ACTION, source })?;

        Ok(Ack {
            action: ACTION,
            message_id: MessageId::new(sent.id),
            mirrored: true,
        })
    }

    /// Labels to mirror for a freshly sent message
    ///
    /// A sent message Gmail also filed under INBOX is moved out with
    /// `modify(+SENT, -INBOX)`. The row follows the labels Gmail reports. When
    /// the relabel fails the row keeps INBOX, as the remote copy does.
    fn file_as_sent(&self, token: &AccessToken, sent: &MessageHandle) -> LabelSet {
        let mut labels = remote_labels(sent).unwrap_or_default();

        if sent.has_label(LabelId::INBOX) {
            let id = MessageId::new(sent.id.as_str());
            match self
                .provider
                .modify_labels(token, &id, &[LabelId::SENT], &[LabelId::INBOX])
            {
                Ok(updated) => match remote_labels(&updated) {
                    Some(updated) => labels = updated,
                    None => {
                        labels.remove(LabelId::INBOX);
                    }
                },
                Err(e) => warn!(
                    "Failed to move sent message {} out of INBOX, keeping it there: {:#}",
                    sent.id, e
                ),
            }
        }

        labels.insert(LabelId::SENT.to_string());
        labels
    }

    /// Rewrite a row's labels; `Ok(false)` when there is no row
    ///
    /// Labels reported in `remote` are mirrored as is. `fallback` derives them
    /// from the stored row when the response carries none.
    fn relabel(
        &self,
        owner_email: &str,
        id: &MessageId,
        remote: &MessageHandle,
        fallback: fn(&MessageRecord) -> LabelSet,
    ) -> anyhow::Result<bool> {
        let Some(record) = self.store.get_message(owner_email, id)? else {
            return Ok(false);
        };
        let labels = remote_labels(remote).unwrap_or_else(|| fallback(&record));
        self.store.update_message_labels(owner_email, id, &labels)
    }
}

/// Labels Gmail reported for a message, if the response listed any
fn remote_labels(handle: &MessageHandle) -> Option<LabelSet> {
    handle
        .label_ids
        .as_ref()
        .map(|ids| ids.iter().cloned().collect())
}

fn validate_id(id: &MessageId) -> Result<(), MutationError> {
    if id.as_str().trim().is_empty() {
        return Err(MutationError::InvalidArgument(
            "message id must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Collapse whitespace and cut to a preview length
fn snippet_of(body: &str) -> String {
    body.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(SENT_SNIPPET_CHARS)
        .collect()
}
