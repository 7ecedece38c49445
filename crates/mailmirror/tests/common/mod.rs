//! Shared fakes for integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use base64::prelude::*;

use mailmirror::gmail::api::{
    Header, ListMessagesResponse, MessageBody, MessageHandle, MessagePayload, MessageRef,
    RawMessage,
};
use mailmirror::{
    AccessToken, CredentialStore, LabelId, MailProvider, MailStore, MailboxCredential,
    MailboxService, MessageId, RefreshError, SyncSettings, TokenRefresher,
};

pub const ALICE_ID: &str = "alice";
pub const ALICE: &str = "alice@example.com";

/// Refresher that accepts one refresh token
pub struct FakeRefresher {
    pub accepted: String,
    pub calls: AtomicUsize,
}

impl FakeRefresher {
    pub fn accepting(token: &str) -> Self {
        Self {
            accepted: token.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl TokenRefresher for FakeRefresher {
    fn refresh(&self, refresh_token: &str) -> Result<AccessToken, RefreshError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if refresh_token == self.accepted {
            Ok(AccessToken::new(format!("atok-{}", n)))
        } else {
            Err(RefreshError::Rejected {
                status: 400,
                error: "invalid_grant".to_string(),
            })
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteMessage {
    pub subject: Option<String>,
    pub from: Option<String>,
    pub body: Option<String>,
    pub snippet: String,
    pub labels: Vec<String>,
}

impl RemoteMessage {
    pub fn new(subject: &str, from: &str, body: &str, labels: &[&str]) -> Self {
        Self {
            subject: Some(subject.to_string()),
            from: Some(from.to_string()),
            body: Some(body.to_string()),
            snippet: body.chars().take(40).collect(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    /// A message with no headers and no body
    pub fn bare(labels: &[&str]) -> Self {
        Self {
            subject: None,
            from: None,
            body: None,
            snippet: String::new(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    fn to_raw(&self, id: &str) -> RawMessage {
        let mut headers = Vec::new();
        if let Some(subject) = &self.subject {
            headers.push(Header {
                name: "Subject".to_string(),
                value: subject.clone(),
            });
        }
        if let Some(from) = &self.from {
            headers.push(Header {
                name: "From".to_string(),
                value: from.clone(),
            });
        }
        RawMessage {
            id: id.to_string(),
            thread_id: Some(format!("t-{}", id)),
            label_ids: Some(self.labels.clone()),
            snippet: Some(self.snippet.clone()),
            payload: Some(MessagePayload {
                mime_type: Some("text/plain".to_string()),
                headers: Some(headers),
                body: self.body.as_ref().map(|b| MessageBody {
                    size: Some(b.len() as u32),
                    data: Some(BASE64_URL_SAFE_NO_PAD.encode(b)),
                }),
                parts: None,
            }),
        }
    }
}

#[derive(Default)]
struct Mailbox {
    messages: BTreeMap<String, RemoteMessage>,
    failing: HashSet<String>,
    /// Labels a message had before it was trashed
    before_trash: HashMap<String, Vec<String>>,
    next_sent: usize,
}

/// In-process Gmail: labels, trash and send behave like the real service
#[derive(Default)]
pub struct FakeGmail {
    pub mailbox: Mutex<Mailbox>,
    pub list_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub modify_calls: AtomicUsize,
    /// Sent messages land in INBOX too, as when mailing yourself
    pub sent_lands_in_inbox: bool,
    /// `modify_labels` answers 503
    pub fail_modify: bool,
}

impl FakeGmail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(self, id: &str, message: RemoteMessage) -> Self {
        self.put(id, message);
        self
    }

    pub fn put(&self, id: &str, message: RemoteMessage) {
        self.mailbox
            .lock()
            .unwrap()
            .messages
            .insert(id.to_string(), message);
    }

    pub fn fail_fetch(&self, id: &str) {
        self.mailbox.lock().unwrap().failing.insert(id.to_string());
    }

    pub fn labels_of(&self, id: &str) -> Option<Vec<String>> {
        self.mailbox
            .lock()
            .unwrap()
            .messages
            .get(id)
            .map(|m| m.labels.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.mailbox.lock().unwrap().messages.contains_key(id)
    }

    pub fn remote_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst) + self.get_calls.load(Ordering::SeqCst)
    }

    fn edit_labels(&self, id: &MessageId, add: &[&str], remove: &[&str]) -> Result<MessageHandle> {
        let mut mailbox = self.mailbox.lock().unwrap();
        let message = mailbox
            .messages
            .get_mut(id.as_str())
            .ok_or_else(|| anyhow!("404 Not Found: {}", id.as_str()))?;
        message.labels.retain(|l| !remove.contains(&l.as_str()));
        for label in add {
            if !message.labels.iter().any(|l| l == label) {
                message.labels.push(label.to_string());
            }
        }
        Ok(MessageHandle {
            id: id.as_str().to_string(),
            thread_id: None,
            label_ids: Some(message.labels.clone()),
        })
    }
}

impl MailProvider for FakeGmail {
    fn list_messages(
        &self,
        _token: &AccessToken,
        label: &LabelId,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mailbox = self.mailbox.lock().unwrap();
        let ids: Vec<&String> = mailbox
            .messages
            .iter()
            .filter(|(_, m)| m.labels.iter().any(|l| l == label.as_str()))
            .map(|(id, _)| id)
            .collect();

        let start: usize = page_token.map(|t| t.parse::<usize>()).transpose()?.unwrap_or(0);
        let end = (start + page_size.max(1) as usize).min(ids.len());
        let page = ids[start.min(end)..end]
            .iter()
            .map(|id| MessageRef {
                id: id.to_string(),
                thread_id: None,
            })
            .collect::<Vec<_>>();

        Ok(ListMessagesResponse {
            messages: if page.is_empty() { None } else { Some(page) },
            next_page_token: (end < ids.len()).then(|| end.to_string()),
            result_size_estimate: Some(ids.len() as u32),
        })
    }

    fn get_message(&self, _token: &AccessToken, id: &MessageId) -> Result<RawMessage> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let mailbox = self.mailbox.lock().unwrap();
        if mailbox.failing.contains(id.as_str()) {
            return Err(anyhow!("404 Not Found: {}", id.as_str()));
        }
        mailbox
            .messages
            .get(id.as_str())
            .map(|m| m.to_raw(id.as_str()))
            .ok_or_else(|| anyhow!("404 Not Found: {}", id.as_str()))
    }

    fn send_message(&self, _token: &AccessToken, raw: &str) -> Result<MessageHandle> {
        let mime = BASE64_URL_SAFE_NO_PAD.decode(raw)?;
        let mime = String::from_utf8(mime)?;
        let subject = mime
            .lines()
            .find_map(|l| l.strip_prefix("Subject: "))
            .map(str::to_string);

        let mut labels = vec!["SENT".to_string()];
        if self.sent_lands_in_inbox {
            labels.push("INBOX".to_string());
        }

        let mut mailbox = self.mailbox.lock().unwrap();
        mailbox.next_sent += 1;
        let id = format!("sent-{}", mailbox.next_sent);
        mailbox.messages.insert(
            id.clone(),
            RemoteMessage {
                subject,
                from: Some(ALICE.to_string()),
                body: None,
                snippet: String::new(),
                labels: labels.clone(),
            },
        );
        Ok(MessageHandle {
            id,
            thread_id: None,
            label_ids: Some(labels),
        })
    }

    fn modify_labels(
        &self,
        _token: &AccessToken,
        id: &MessageId,
        add: &[&str],
        remove: &[&str],
    ) -> Result<MessageHandle> {
        self.modify_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_modify {
            return Err(anyhow!("503 Service Unavailable"));
        }
        self.edit_labels(id, add, remove)
    }

    fn trash_message(&self, _token: &AccessToken, id: &MessageId) -> Result<MessageHandle> {
        if let Some(labels) = self.labels_of(id.as_str()) {
            self.mailbox
                .lock()
                .unwrap()
                .before_trash
                .insert(id.as_str().to_string(), labels);
        }
        self.edit_labels(id, &["TRASH"], &["INBOX"])
    }

    /// Puts back the labels from before the trash, like Gmail does
    fn untrash_message(&self, _token: &AccessToken, id: &MessageId) -> Result<MessageHandle> {
        let before = self.mailbox.lock().unwrap().before_trash.remove(id.as_str());
        match before {
            Some(labels) => {
                let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
                self.edit_labels(id, &labels, &["TRASH"])
            }
            None => self.edit_labels(id, &[], &["TRASH"]),
        }
    }

    fn delete_message(&self, _token: &AccessToken, id: &MessageId) -> Result<()> {
        self.mailbox
            .lock()
            .unwrap()
            .messages
            .remove(id.as_str())
            .map(|_| ())
            .ok_or_else(|| anyhow!("404 Not Found: {}", id.as_str()))
    }
}

/// Register alice with refresh token `rtok1`
pub fn register_alice(store: &dyn CredentialStore) {
    store
        .save_credential(MailboxCredential::new(ALICE_ID, ALICE).with_refresh_token("rtok1"))
        .unwrap();
}

/// Settings without retries or cooldown so tests run instantly
pub fn test_settings() -> SyncSettings {
    SyncSettings {
        fetch_attempts: 1,
        sync_cooldown_secs: 0,
        ..SyncSettings::default()
    }
}

pub fn service<S>(gmail: Arc<FakeGmail>, store: Arc<S>) -> MailboxService
where
    S: MailStore + 'static,
{
    service_with(gmail, store, test_settings())
}

pub fn service_with<S>(
    gmail: Arc<FakeGmail>,
    store: Arc<S>,
    settings: SyncSettings,
) -> MailboxService
where
    S: MailStore + 'static,
{
    MailboxService::new(
        Arc::new(FakeRefresher::accepting("rtok1")),
        gmail,
        store,
        settings,
    )
}
