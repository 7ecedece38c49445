//! Mail provider abstraction
//!
//! The fetcher and the mutation dispatcher talk to the remote mailbox only
//! through this trait, so tests can substitute an in-process fake.

use anyhow::Result;

use super::api::{ListMessagesResponse, MessageHandle, RawMessage};
use crate::models::{AccessToken, LabelId, MessageId};

/// Remote mailbox operations used by sync and mutations
pub trait MailProvider: Send + Sync {
    /// List one page of message ids carrying `label`
    fn list_messages(
        &self,
        token: &AccessToken,
        label: &LabelId,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse>;

    /// Fetch the full representation of one message
    fn get_message(&self, token: &AccessToken, id: &MessageId) -> Result<RawMessage>;

    /// Submit a base64url-encoded RFC 2822 message
    fn send_message(&self, token: &AccessToken, raw: &str) -> Result<MessageHandle>;

    /// Add and remove labels on one message
    fn modify_labels(
        &self,
        token: &AccessToken,
        id: &MessageId,
        add: &[&str],
        remove: &[&str],
    ) -> Result<MessageHandle>;

    /// Move a message to trash
    fn trash_message(&self, token: &AccessToken, id: &MessageId) -> Result<MessageHandle>;

    /// Take a message out of trash
    fn untrash_message(&self, token: &AccessToken, id: &MessageId) -> Result<MessageHandle>;

    /// Permanently delete a message, bypassing trash
    fn delete_message(&self, token: &AccessToken, id: &MessageId) -> Result<()>;
}
