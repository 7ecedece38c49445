//! Outgoing message composition
//!
//! Builds the RFC 2822 text Gmail expects in `messages/send` and wraps it in
//! the base64url envelope.

use base64::prelude::*;
use serde::{Deserialize, Serialize};

/// Body format of an outgoing message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    #[default]
    Plain,
    Html,
}

impl ContentType {
    fn header_value(self) -> &'static str {
        match self {
            ContentType::Plain => "text/plain; charset=\"UTF-8\"",
            ContentType::Html => "text/html; charset=\"UTF-8\"",
        }
    }
}

/// A message the user wants to send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub content_type: ContentType,
}

impl OutgoingMessage {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            content_type: ContentType::Plain,
        }
    }

    pub fn html(mut self) -> Self {
        self.content_type = ContentType::Html;
        self
    }
}

/// Render the full MIME text for `message` sent from `from`
pub fn build_raw_message(from: &str, message: &OutgoingMessage) -> String {
    let headers = [
        format!("From: {}", header_value(from)),
        format!("To: {}", header_value(&message.to)),
        format!("Subject: {}", encode_subject(&header_value(&message.subject))),
        "MIME-Version: 1.0".to_string(),
        format!("Content-Type: {}", message.content_type.header_value()),
        "Content-Transfer-Encoding: 8bit".to_string(),
    ];

    let body = message.body.replace("\r\n", "\n").replace('\n', "\r\n");
    format!("{}\r\n\r\n{}", headers.join("\r\n"), body)
}

/// Base64url without padding, as required by the `raw` field
pub fn encode_raw_message(mime: &str) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(mime.as_bytes())
}

/// Strip line breaks so a value cannot inject extra headers
fn header_value(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect::<String>()
        .trim()
        .to_string()
}

/// RFC 2047 encoded-word for non-ASCII subjects
fn encode_subject(subject: &str) -> String {
    if subject.is_ascii() {
        subject.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", BASE64_STANDARD.encode(subject.as_bytes()))
    }
}
