//! Mirrored message row

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LabelId, LabelSet};

/// Unique identifier for a message (Gmail message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A message as mirrored into local storage
///
/// Keyed by `(id, owner_email)`. `created_at` is the time the row was first
/// synced, not the provider's delivery timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    /// Lowercased address of the mailbox this row belongs to
    pub owner_email: String,
    pub subject: String,
    /// Raw `From` header value
    pub sender: String,
    pub snippet: String,
    /// Decoded plain-text body, empty when none was found
    pub body: String,
    pub labels: LabelSet,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    pub fn new(id: impl Into<MessageId>, owner_email: impl AsRef<str>) -> Self {
        Self {
            id: id.into(),
            owner_email: owner_email.as_ref().trim().to_lowercase(),
            subject: String::new(),
            sender: String::new(),
            snippet: String::new(),
            body: String::new(),
            labels: LabelSet::new(),
            created_at: Utc::now(),
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// Unread state is derived from the label set
    pub fn is_unread(&self) -> bool {
        self.has_label(LabelId::UNREAD)
    }

    /// Move to trash: drop INBOX, add TRASH
    pub fn trashed_labels(&self) -> LabelSet {
        let mut labels = self.labels.clone();
        labels.remove(LabelId::INBOX);
        labels.insert(LabelId::TRASH.to_string());
        labels
    }

    /// Restore from trash: drop TRASH, add INBOX
    pub fn restored_labels(&self) -> LabelSet {
        let mut labels = self.labels.clone();
        labels.remove(LabelId::TRASH);
        labels.insert(LabelId::INBOX.to_string());
        labels
    }

    /// Case-insensitive match against sender, subject and snippet
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        [&self.sender, &self.subject, &self.snippet]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}
