//! Gmail label identifiers and request-scoped label filters

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Set of label identifiers attached to a message
pub type LabelSet = BTreeSet<String>;

/// Unique identifier for a label (Gmail label ID)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LabelId(pub String);

impl LabelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // Well-known Gmail system labels
    pub const INBOX: &'static str = "INBOX";
    pub const SENT: &'static str = "SENT";
    pub const TRASH: &'static str = "TRASH";
    pub const UNREAD: &'static str = "UNREAD";
    pub const STARRED: &'static str = "STARRED";
    pub const SPAM: &'static str = "SPAM";
}

impl From<String> for LabelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LabelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Labels a sync pass should request from the provider
///
/// Never empty: an unspecified or blank filter falls back to `INBOX`.
/// Label ids keep their first-seen order and are deduplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelFilter {
    labels: Vec<LabelId>,
}

impl LabelFilter {
    /// Build a filter from caller input, defaulting to `INBOX`
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<LabelId> = Vec::new();
        for label in labels {
            let label = label.as_ref().trim();
            if label.is_empty() || unique.iter().any(|l| l.as_str() == label) {
                continue;
            }
            unique.push(LabelId::new(label));
        }

        if unique.is_empty() {
            return Self::inbox();
        }
        Self { labels: unique }
    }

    /// Filter from an optional caller-supplied list
    pub fn from_option(labels: Option<Vec<String>>) -> Self {
        Self::new(labels.unwrap_or_default())
    }

    pub fn inbox() -> Self {
        Self {
            labels: vec![LabelId::new(LabelId::INBOX)],
        }
    }

    pub fn labels(&self) -> &[LabelId] {
        &self.labels
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.as_str() == label)
    }
}

impl Default for LabelFilter {
    fn default() -> Self {
        Self::inbox()
    }
}
