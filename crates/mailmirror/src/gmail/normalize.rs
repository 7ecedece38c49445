//! Gmail API response normalization
//!
//! Converts raw Gmail messages to mirrored `MessageRecord` rows. Never fails:
//! missing or malformed pieces degrade to placeholders or empty strings so a
//! single odd message cannot abort a sync.

use base64::prelude::*;
use chrono::{DateTime, Utc};

use super::api::{MessagePart, MessagePayload, RawMessage};
use crate::models::{LabelSet, MessageId, MessageRecord};

/// Subject shown when the header is missing or empty
pub const NO_SUBJECT: &str = "(No Subject)";

/// Sender shown when the `From` header is missing or empty
pub const NO_SENDER: &str = "(Unknown)";

/// Normalize a Gmail API message into a mirrored row
///
/// # Arguments
/// * `raw` - Message fetched with `format=full`
/// * `owner_email` - Mailbox the message was synced from
/// * `synced_at` - Timestamp recorded as `created_at`
pub fn normalize_message(
    raw: &RawMessage,
    owner_email: &str,
    synced_at: DateTime<Utc>,
) -> MessageRecord {
    let payload = raw.payload.as_ref();

    let subject = payload
        .and_then(|p| extract_header(p, "Subject"))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| NO_SUBJECT.to_string());

    let sender = payload
        .and_then(|p| extract_header(p, "From"))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| NO_SENDER.to_string());

    let snippet = raw
        .snippet
        .as_deref()
        .map(decode_html_entities)
        .unwrap_or_default();

    let body = payload.map(extract_body).unwrap_or_default();

    let labels: LabelSet = raw.label_ids.iter().flatten().cloned().collect();

    MessageRecord {
        id: MessageId::new(&raw.id),
        owner_email: owner_email.trim().to_lowercase(),
        subject,
        sender,
        snippet,
        body,
        labels,
        created_at: synced_at,
    }
}

/// Extract a header value by name
fn extract_header(payload: &MessagePayload, name: &str) -> Option<String> {
    payload.headers.as_ref()?.iter().find_map(|h| {
        if h.name.eq_ignore_ascii_case(name) {
            Some(h.value.clone())
        } else {
            None
        }
    })
}

/// Extract the plain-text body
///
/// Prefers the first `text/plain` part (searching nested multiparts depth
/// first), then the top-level body data. Returns an empty string when neither
/// yields anything.
pub fn extract_body(payload: &MessagePayload) -> String {
    if let Some(parts) = &payload.parts
        && let Some(text) = find_plain_text_in_parts(parts)
    {
        return text;
    }

    if let Some(body) = &payload.body
        && let Some(data) = &body.data
        && let Some(text) = decode_base64_body(data)
    {
        return text;
    }

    String::new()
}

/// Recursively search message parts for text/plain content
fn find_plain_text_in_parts(parts: &[MessagePart]) -> Option<String> {
    for part in parts {
        if part
            .mime_type
            .as_ref()
            .is_some_and(|m| m.to_ascii_lowercase().starts_with("text/plain"))
            && let Some(body) = &part.body
            && let Some(data) = &body.data
            && let Some(text) = decode_base64_body(data)
        {
            return Some(text);
        }

        if let Some(nested) = &part.parts
            && let Some(text) = find_plain_text_in_parts(nested)
        {
            return Some(text);
        }
    }

    None
}

/// Decode base64-encoded body data
///
/// Gmail uses URL-safe base64 but padding can vary, so we try multiple
/// decoders. Invalid UTF-8 is replaced rather than rejected.
fn decode_base64_body(data: &str) -> Option<String> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};

    if data.is_empty() {
        return None;
    }

    let decoders: &[&base64::engine::GeneralPurpose] =
        &[&BASE64_URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

    decoders
        .iter()
        .find_map(|decoder| decoder.decode(data).ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Decode HTML entities in snippet text
fn decode_html_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
