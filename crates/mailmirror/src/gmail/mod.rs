//! Gmail API integration
//!
//! This module provides:
//! - OAuth2 refresh-token exchange
//! - Gmail REST client behind the `MailProvider` trait
//! - Raw message normalization to `MessageRecord`
//! - MIME composition for outgoing mail

mod auth;
mod client;
mod compose;
mod normalize;
mod provider;

pub use auth::{GmailAuth, TokenRefresher};
pub use client::{GmailClient, is_transient};
pub use compose::{ContentType, OutgoingMessage, build_raw_message, encode_raw_message};
pub use normalize::{NO_SENDER, NO_SUBJECT, extract_body, normalize_message};
pub use provider::MailProvider;

/// Gmail API request and response types
///
/// Only the fields the pipeline consumes are modelled.
pub mod api {
    use serde::{Deserialize, Serialize};

    /// Response from listing messages
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListMessagesResponse {
        pub messages: Option<Vec<MessageRef>>,
        pub next_page_token: Option<String>,
        pub result_size_estimate: Option<u32>,
    }

    /// Reference to a message (just ID and thread ID)
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageRef {
        pub id: String,
        #[serde(default)]
        pub thread_id: Option<String>,
    }

    /// Full message from the Gmail API (`format=full`)
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct RawMessage {
        pub id: String,
        #[serde(default)]
        pub thread_id: Option<String>,
        #[serde(default)]
        pub label_ids: Option<Vec<String>>,
        #[serde(default)]
        pub snippet: Option<String>,
        #[serde(default)]
        pub payload: Option<MessagePayload>,
    }

    /// Message payload containing headers and body
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePayload {
        pub mime_type: Option<String>,
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Clone, Deserialize, Serialize)]
    pub struct Header {
        pub name: String,
        #[serde(default)]
        pub value: String,
    }

    /// Message body (base64url encoded)
    #[derive(Debug, Clone, Default, Deserialize)]
    pub struct MessageBody {
        pub size: Option<u32>,
        pub data: Option<String>,
    }

    /// Message part (for multipart messages)
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePart {
        pub part_id: Option<String>,
        pub mime_type: Option<String>,
        pub filename: Option<String>,
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePart>>,
    }

    /// Message resource returned by send, modify, trash and untrash
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageHandle {
        pub id: String,
        #[serde(default)]
        pub thread_id: Option<String>,
        #[serde(default)]
        pub label_ids: Option<Vec<String>>,
    }

    impl MessageHandle {
        pub fn has_label(&self, label: &str) -> bool {
            self.label_ids
                .as_ref()
                .is_some_and(|ids| ids.iter().any(|l| l == label))
        }
    }

    /// Body of `messages/send`
    #[derive(Debug, Serialize)]
    pub struct SendMessageRequest<'a> {
        pub raw: &'a str,
    }

    /// Body of `messages/{id}/modify`
    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ModifyMessageRequest<'a> {
        pub add_label_ids: &'a [&'a str],
        pub remove_label_ids: &'a [&'a str],
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_deserialize_full_message() {
            let json = r#"{
                "id": "m1",
                "threadId": "t1",
                "labelIds": ["INBOX", "UNREAD"],
                "snippet": "Hello there",
                "internalDate": "1700000000000",
                "payload": {
                    "mimeType": "multipart/alternative",
                    "headers": [{"name": "Subject", "value": "Hi"}],
                    "parts": [
                        {"partId": "0", "mimeType": "text/plain", "body": {"size": 5, "data": "SGVsbG8"}}
                    ]
                }
            }"#;

            let msg: RawMessage = serde_json::from_str(json).unwrap();
            assert_eq!(msg.id, "m1");
            assert_eq!(msg.label_ids.as_deref().map(|l| l.len()), Some(2));
            let payload = msg.payload.unwrap();
            assert_eq!(payload.parts.unwrap().len(), 1);
        }

        #[test]
        fn test_deserialize_sparse_message() {
            let msg: RawMessage = serde_json::from_str(r#"{"id": "m2"}"#).unwrap();
            assert!(msg.payload.is_none());
            assert!(msg.snippet.is_none());
        }

        #[test]
        fn test_deserialize_empty_list() {
            let list: ListMessagesResponse =
                serde_json::from_str(r#"{"resultSizeEstimate": 0}"#).unwrap();
            assert!(list.messages.is_none());
            assert!(list.next_page_token.is_none());
        }

        #[test]
        fn test_serialize_modify_request() {
            let body = ModifyMessageRequest {
                add_label_ids: &["SENT"],
                remove_label_ids: &["INBOX"],
            };
            let json = serde_json::to_value(&body).unwrap();
            assert_eq!(json["addLabelIds"][0], "SENT");
            assert_eq!(json["removeLabelIds"][0], "INBOX");
        }
    }
}
