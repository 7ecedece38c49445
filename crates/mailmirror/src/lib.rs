//! Mailmirror - Gmail mirroring pipeline
//!
//! This crate keeps a local copy of a user's Gmail mailbox:
//! - OAuth refresh-token exchange
//! - Label-filtered listing and parallel detail fetches
//! - Normalization of Gmail payloads into flat message rows
//! - SQLite (or in-memory) storage with idempotent upserts
//! - Mutations (trash, restore, permanent delete, send) mirrored locally
//!
//! The crate has no UI dependencies; the `ffi` module exposes it to
//! Swift/Kotlin through UniFFI.

uniffi::setup_scaffolding!();

pub mod actions;
pub mod config;
pub mod error;
pub mod ffi;
pub mod gmail;
pub mod models;
pub mod query;
pub mod service;
pub mod storage;
pub mod sync;

pub use actions::{Ack, ActionHandler, MailAction};
pub use config::{GmailCredentials, SyncSettings};
pub use error::{FetchError, MutationError, RefreshError, SyncError};
pub use gmail::{
    GmailAuth, GmailClient, MailProvider, OutgoingMessage, TokenRefresher, normalize_message,
};
pub use models::{
    AccessToken, LabelFilter, LabelId, LabelSet, MailboxCredential, MessageId, MessageRecord,
};
pub use query::{MessageQuery, MessageSummary};
pub use service::MailboxService;
pub use storage::{CredentialStore, InMemoryMailStore, MailStore, MessageStore, SqliteMailStore};
pub use sync::{
    CancellationToken, SyncCoordinator, SyncObserver, SyncPhase, SyncSession, SyncStats,
    cooldown_elapsed,
};
