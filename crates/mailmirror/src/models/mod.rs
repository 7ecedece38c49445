//! Domain models for mirrored mailbox entities

mod credential;
mod label;
mod message;

pub use credential::{AccessToken, MailboxCredential};
pub use label::{LabelFilter, LabelId, LabelSet};
pub use message::{MessageId, MessageRecord};
