//! Message query functions

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{LabelSet, MessageId, MessageRecord};
use crate::storage::MessageStore;

/// Filter and page for listing a mailbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageQuery {
    /// Mailbox to list; matched case-insensitively
    pub owner_email: String,
    /// Only rows carrying this label
    pub label: Option<String>,
    /// Case-insensitive substring over sender, subject and snippet
    pub search: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl MessageQuery {
    /// Rows returned when no limit is given
    pub const DEFAULT_LIMIT: usize = 50;

    /// Hard ceiling on a single page
    pub const MAX_LIMIT: usize = 500;

    pub fn new(owner_email: impl AsRef<str>) -> Self {
        Self {
            owner_email: owner_email.as_ref().trim().to_lowercase(),
            label: None,
            search: None,
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// Limit with 0 mapped to the default and large values clamped
    pub fn effective_limit(&self) -> usize {
        match self.limit {
            0 => Self::DEFAULT_LIMIT,
            n => n.min(Self::MAX_LIMIT),
        }
    }

    /// Trimmed search needle, `None` when blank
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Summary information for displaying a message in a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub id: MessageId,
    pub subject: String,
    pub sender: String,
    pub snippet: String,
    pub labels: LabelSet,
    pub is_unread: bool,
    /// When the message was first mirrored
    pub created_at: DateTime<Utc>,
}

impl From<MessageRecord> for MessageSummary {
    fn from(record: MessageRecord) -> Self {
        let is_unread = record.is_unread();
        Self {
            id: record.id,
            subject: record.subject,
            sender: record.sender,
            snippet: record.snippet,
            labels: record.labels,
            is_unread,
            created_at: record.created_at,
        }
    }
}

/// List messages for a mailbox
///
/// Returns messages sorted by created_at descending (newest first).
///
/// # Arguments
/// * `store` - The storage backend
/// * `query` - Mailbox, optional label and search filters, and page
pub fn list_messages(
    store: &dyn MessageStore,
    query: &MessageQuery,
) -> Result<Vec<MessageSummary>> {
    let records = store.query_messages(query)?;
    Ok(records.into_iter().map(MessageSummary::from).collect())
}

/// Get a single message with its body
pub fn get_message_detail(
    store: &dyn MessageStore,
    owner_email: &str,
    id: &MessageId,
) -> Result<Option<MessageRecord>> {
    store.get_message(&owner_email.trim().to_lowercase(), id)
}

/// Count unread messages, optionally restricted to a label
pub fn count_unread(
    store: &dyn MessageStore,
    owner_email: &str,
    label: Option<&str>,
) -> Result<usize> {
    store.count_unread(&owner_email.trim().to_lowercase(), label)
}
