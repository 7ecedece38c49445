//! Storage trait definitions

use anyhow::Result;

use crate::models::{AccessToken, LabelSet, MailboxCredential, MessageId, MessageRecord};
use crate::query::MessageQuery;

/// Mailbox credentials, owned by the auth layer
///
/// The sync pipeline only reads credentials and writes back refreshed access
/// tokens.
pub trait CredentialStore: Send + Sync {
    /// Get the credential registered for a user
    fn get_credential(&self, user_id: &str) -> Result<Option<MailboxCredential>>;

    /// Insert or replace a user's credential (email must stay unique)
    fn save_credential(&self, credential: MailboxCredential) -> Result<()>;

    /// Record a freshly refreshed access token; a missing user is a no-op
    fn update_access_token(&self, user_id: &str, token: &AccessToken) -> Result<()>;
}

/// Mirrored messages keyed by `(id, owner_email)`
///
/// Owner emails passed in are expected to be lowercased already.
pub trait MessageStore: Send + Sync {
    /// Insert or overwrite a batch of messages atomically
    ///
    /// On conflict every field except `created_at` is replaced, including the
    /// label set. Duplicate ids within the batch collapse to the last one.
    /// Returns the number of distinct rows written.
    fn upsert_messages(&self, records: Vec<MessageRecord>) -> Result<usize>;

    /// Get a message by ID
    fn get_message(&self, owner_email: &str, id: &MessageId) -> Result<Option<MessageRecord>>;

    /// Replace a message's labels; returns false when the row does not exist
    fn update_message_labels(
        &self,
        owner_email: &str,
        id: &MessageId,
        labels: &LabelSet,
    ) -> Result<bool>;

    /// Delete a message; returns false when the row did not exist
    fn delete_message(&self, owner_email: &str, id: &MessageId) -> Result<bool>;

    /// List messages newest first (created_at descending, then id)
    fn query_messages(&self, query: &MessageQuery) -> Result<Vec<MessageRecord>>;

    /// Count all messages in a mailbox
    fn count_messages(&self, owner_email: &str) -> Result<usize>;

    /// Count UNREAD messages, optionally restricted to one label
    fn count_unread(&self, owner_email: &str, label: Option<&str>) -> Result<usize>;

    /// Clear all data (for testing)
    fn clear(&self) -> Result<()>;
}

/// A store that holds both credentials and messages
pub trait MailStore: CredentialStore + MessageStore {}

impl<T: CredentialStore + MessageStore> MailStore for T {}
