//! Gmail API HTTP client
//!
//! Provides the `MailProvider` implementation backed by the Gmail REST API.
//! Uses synchronous HTTP (ureq) to be executor-agnostic. Every request is
//! bounded by the agent's global timeout.

use anyhow::{Context, Result};
use log::debug;
use std::time::Duration;

use super::MailProvider;
use super::api::{
    ListMessagesResponse, MessageHandle, ModifyMessageRequest, RawMessage, SendMessageRequest,
};
use crate::models::{AccessToken, LabelId, MessageId};

/// Gmail API client
pub struct GmailClient {
    agent: ureq::Agent,
    base_url: String,
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Upper bound Gmail accepts for `maxResults`
    pub const MAX_PAGE_SIZE: u32 = 500;

    /// Create a new Gmail client with a per-request timeout
    pub fn new(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Self {
            agent,
            base_url: Self::BASE_URL.to_string(),
        }
    }

    /// Point the client at a different API root (emulators, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn message_url(&self, id: &MessageId) -> String {
        format!(
            "{}/users/me/messages/{}",
            self.base_url,
            urlencoding::encode(id.as_str())
        )
    }

    /// Build the list URL for one label page
    fn list_url(
        &self,
        label: &LabelId,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<String> {
        let page_size = page_size.clamp(1, Self::MAX_PAGE_SIZE).to_string();
        let mut params = vec![("labelIds", label.as_str()), ("maxResults", page_size.as_str())];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let base = format!("{}/users/me/messages", self.base_url);
        let url = url::Url::parse_with_params(&base, &params)
            .context("Failed to build list messages URL")?;
        Ok(url.into())
    }
}

impl MailProvider for GmailClient {
    fn list_messages(
        &self,
        token: &AccessToken,
        label: &LabelId,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse> {
        let url = self.list_url(label, page_size, page_token)?;

        let mut response = self
            .agent
            .get(&url)
            .header("Authorization", &token.bearer())
            .call()
            .context("Failed to send list messages request")?;

        let list: ListMessagesResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse list messages response")?;

        Ok(list)
    }

    fn get_message(&self, token: &AccessToken, id: &MessageId) -> Result<RawMessage> {
        let url = format!("{}?format=full", self.message_url(id));

        let mut response = self
            .agent
            .get(&url)
            .header("Authorization", &token.bearer())
            .call()
            .with_context(|| format!("Failed to fetch message {}", id.as_str()))?;

        let message: RawMessage = response
            .body_mut()
            .read_json()
            .with_context(|| format!("Failed to parse message {}", id.as_str()))?;

        Ok(message)
    }

    fn send_message(&self, token: &AccessToken, raw: &str) -> Result<MessageHandle> {
        let url = format!("{}/users/me/messages/send", self.base_url);

        let mut response = self
            .agent
            .post(&url)
            .header("Authorization", &token.bearer())
            .send_json(&SendMessageRequest { raw })
            .context("Failed to send message")?;

        let sent: MessageHandle = response
            .body_mut()
            .read_json()
            .context("Failed to parse send response")?;

        debug!("Gmail accepted message {}", sent.id);
        Ok(sent)
    }

    fn modify_labels(
        &self,
        token: &AccessToken,
        id: &MessageId,
        add: &[&str],
        remove: &[&str],
    ) -> Result<MessageHandle> {
        let url = format!("{}/modify", self.message_url(id));

        let mut response = self
            .agent
            .post(&url)
            .header("Authorization", &token.bearer())
            .send_json(&ModifyMessageRequest {
                add_label_ids: add,
                remove_label_ids: remove,
            })
            .with_context(|| format!("Failed to modify labels on {}", id.as_str()))?;

        response
            .body_mut()
            .read_json()
            .context("Failed to parse modify response")
    }

    fn trash_message(&self, token: &AccessToken, id: &MessageId) -> Result<MessageHandle> {
        let url = format!("{}/trash", self.message_url(id));

        let mut response = self
            .agent
            .post(&url)
            .header("Authorization", &token.bearer())
            .send_empty()
            .with_context(|| format!("Failed to trash message {}", id.as_str()))?;

        response
            .body_mut()
            .read_json()
            .context("Failed to parse trash response")
    }

    fn untrash_message(&self, token: &AccessToken, id: &MessageId) -> Result<MessageHandle> {
        let url = format!("{}/untrash", self.message_url(id));

        let mut response = self
            .agent
            .post(&url)
            .header("Authorization", &token.bearer())
            .send_empty()
            .with_context(|| format!("Failed to untrash message {}", id.as_str()))?;

        response
            .body_mut()
            .read_json()
            .context("Failed to parse untrash response")
    }

    fn delete_message(&self, token: &AccessToken, id: &MessageId) -> Result<()> {
        self.agent
            .delete(&self.message_url(id))
            .header("Authorization", &token.bearer())
            .call()
            .with_context(|| format!("Failed to delete message {}", id.as_str()))?;
        Ok(())
    }
}

/// Whether a provider error is worth retrying (throttling, 5xx, timeouts)
///
/// Errors that did not come from the HTTP layer are treated as permanent.
pub fn is_transient(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<ureq::Error>() {
        Some(ureq::Error::StatusCode(code)) => *code == 429 || *code >= 500,
        Some(ureq::Error::Timeout(_)) | Some(ureq::Error::Io(_)) => true,
        _ => false,
    }
}
