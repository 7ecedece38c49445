//! In-memory storage implementation
//!
//! Used by tests and by hosts that do not need persistence.

use anyhow::{Result, anyhow, bail};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{CredentialStore, MessageStore};
use crate::models::{AccessToken, LabelSet, MailboxCredential, MessageId, MessageRecord};
use crate::query::MessageQuery;

type MessageKey = (String, String);

/// In-memory implementation of `CredentialStore` and `MessageStore`
///
/// Uses HashMaps protected by RwLocks for thread-safe access.
pub struct InMemoryMailStore {
    /// user_id -> credential
    credentials: RwLock<HashMap<String, MailboxCredential>>,
    /// (owner_email, message id) -> row
    messages: RwLock<HashMap<MessageKey, MessageRecord>>,
}

impl InMemoryMailStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            credentials: RwLock::new(HashMap::new()),
            messages: RwLock::new(HashMap::new()),
        }
    }

    fn read_messages(&self) -> Result<RwLockReadGuard<'_, HashMap<MessageKey, MessageRecord>>> {
        self.messages.read().map_err(|_| anyhow!("message map lock poisoned"))
    }

    fn write_messages(&self) -> Result<RwLockWriteGuard<'_, HashMap<MessageKey, MessageRecord>>> {
        self.messages.write().map_err(|_| anyhow!("message map lock poisoned"))
    }

    fn key(owner_email: &str, id: &MessageId) -> MessageKey {
        (owner_email.to_string(), id.0.clone())
    }
}

impl Default for InMemoryMailStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for InMemoryMailStore {
    fn get_credential(&self, user_id: &str) -> Result<Option<MailboxCredential>> {
        let credentials = self
            .credentials
            .read()
            .map_err(|_| anyhow!("credential map lock poisoned"))?;
        Ok(credentials.get(user_id).cloned())
    }

    fn save_credential(&self, credential: MailboxCredential) -> Result<()> {
        let mut credentials = self
            .credentials
            .write()
            .map_err(|_| anyhow!("credential map lock poisoned"))?;

        if let Some(other) = credentials
            .values()
            .find(|c| c.email == credential.email && c.user_id != credential.user_id)
        {
            bail!(
                "Mailbox {} is already registered to user {}",
                credential.email,
                other.user_id
            );
        }

        credentials.insert(credential.user_id.clone(), credential);
        Ok(())
    }

    fn update_access_token(&self, user_id: &str, token: &AccessToken) -> Result<()> {
        let mut credentials = self
            .credentials
            .write()
            .map_err(|_| anyhow!("credential map lock poisoned"))?;
        if let Some(credential) = credentials.get_mut(user_id) {
            credential.access_token = Some(token.as_str().to_string());
        }
        Ok(())
    }
}

impl MessageStore for InMemoryMailStore {
    fn upsert_messages(&self, records: Vec<MessageRecord>) -> Result<usize> {
        // Collapse duplicates first so the batch applies as one unit
        let mut batch: HashMap<MessageKey, MessageRecord> = HashMap::new();
        for record in records {
            batch.insert(Self::key(&record.owner_email, &record.id), record);
        }

        let written = batch.len();
        let mut messages = self.write_messages()?;
        for (key, mut record) in batch {
            if let Some(existing) = messages.get(&key) {
                record.created_at = existing.created_at;
            }
            messages.insert(key, record);
        }

        Ok(written)
    }

    fn get_message(&self, owner_email: &str, id: &MessageId) -> Result<Option<MessageRecord>> {
        let messages = self.read_messages()?;
        Ok(messages.get(&Self::key(owner_email, id)).cloned())
    }

    fn update_message_labels(
        &self,
        owner_email: &str,
        id: &MessageId,
        labels: &LabelSet,
    ) -> Result<bool> {
        let mut messages = self.write_messages()?;
        match messages.get_mut(&Self::key(owner_email, id)) {
            Some(record) => {
                record.labels = labels.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_message(&self, owner_email: &str, id: &MessageId) -> Result<bool> {
        let mut messages = self.write_messages()?;
        Ok(messages.remove(&Self::key(owner_email, id)).is_some())
    }

    fn query_messages(&self, query: &MessageQuery) -> Result<Vec<MessageRecord>> {
        let messages = self.read_messages()?;
        let owner = query.owner_email.trim().to_lowercase();
        let search = query.search_term();

        let mut matched: Vec<&MessageRecord> = messages
            .values()
            .filter(|m| m.owner_email == owner)
            .filter(|m| query.label.as_deref().is_none_or(|l| m.has_label(l)))
            .filter(|m| search.is_none_or(|s| m.matches_search(s)))
            .collect();

        matched.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.0.cmp(&b.id.0))
        });

        Ok(matched
            .into_iter()
            .skip(query.offset)
            .take(query.effective_limit())
            .cloned()
            .collect())
    }

    fn count_messages(&self, owner_email: &str) -> Result<usize> {
        let messages = self.read_messages()?;
        Ok(messages.keys().filter(|(owner, _)| owner == owner_email).count())
    }

    fn count_unread(&self, owner_email: &str, label: Option<&str>) -> Result<usize> {
        let messages = self.read_messages()?;
        Ok(messages
            .values()
            .filter(|m| m.owner_email == owner_email && m.is_unread())
            .filter(|m| label.is_none_or(|l| m.has_label(l)))
            .count())
    }

    fn clear(&self) -> Result<()> {
        self.write_messages()?.clear();
        self.credentials
            .write()
            .map_err(|_| anyhow!("credential map lock poisoned"))?
            .clear();
        Ok(())
    }
}
