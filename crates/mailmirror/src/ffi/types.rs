//! FFI-friendly type wrappers for UniFFI export
//!
//! These types convert internal Rust types to FFI-compatible versions:
//! - `DateTime<Utc>` → `i64` (Unix timestamp)
//! - `MessageId` → `String`
//! - Label sets → `Vec<String>`
//! - Typed error enums → `MailError`

use crate::actions::Ack;
use crate::error::{MutationError, SyncError};
use crate::gmail::{ContentType, OutgoingMessage};
use crate::models::MessageRecord;
use crate::query::MessageSummary;
use crate::sync::{SyncObserver, SyncPhase, SyncStats};

// ============================================================================
// Error Types
// ============================================================================

/// FFI-friendly error type
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum MailError {
    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    /// The user has to reconnect the account
    #[error("Authentication required: {message}")]
    AuthRequired { message: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Sync already running for {email}")]
    Busy { email: String },

    #[error("Sync cancelled")]
    Cancelled,
}

impl From<anyhow::Error> for MailError {
    fn from(e: anyhow::Error) -> Self {
        let message = format!("{e:#}");
        if e.downcast_ref::<ureq::Error>().is_some() {
            MailError::Network { message }
        } else {
            MailError::Database { message }
        }
    }
}

impl From<SyncError> for MailError {
    fn from(e: SyncError) -> Self {
        let message = e.to_string();
        match e {
            SyncError::NoCredential { .. } | SyncError::Auth(_) => {
                MailError::AuthRequired { message }
            }
            SyncError::Fetch(_) => MailError::Network { message },
            SyncError::Persistence(_) => MailError::Database { message },
            SyncError::AlreadyRunning { email } => MailError::Busy { email },
            SyncError::Cancelled => MailError::Cancelled,
        }
    }
}

impl From<MutationError> for MailError {
    fn from(e: MutationError) -> Self {
        let message = e.to_string();
        match e {
            MutationError::NoCredential { .. } | MutationError::Auth(_) => {
                MailError::AuthRequired { message }
            }
            MutationError::InvalidArgument(message) => MailError::InvalidArgument { message },
            MutationError::Remote { .. } => MailError::Network { message },
            MutationError::Store(_) | MutationError::Mirror { .. } => {
                MailError::Database { message }
            }
        }
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// FFI-friendly message summary for list views
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMessageSummary {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub snippet: String,
    pub labels: Vec<String>,
    pub is_unread: bool,
    /// Unix timestamp (seconds since epoch) of first sync
    pub created_at: i64,
}

impl From<MessageSummary> for FfiMessageSummary {
    fn from(m: MessageSummary) -> Self {
        Self {
            id: m.id.0,
            subject: m.subject,
            sender: m.sender,
            snippet: m.snippet,
            labels: m.labels.into_iter().collect(),
            is_unread: m.is_unread,
            created_at: m.created_at.timestamp(),
        }
    }
}

/// FFI-friendly full message
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMessage {
    pub id: String,
    pub owner_email: String,
    pub subject: String,
    pub sender: String,
    pub snippet: String,
    pub body: String,
    pub labels: Vec<String>,
    pub is_unread: bool,
    /// Unix timestamp (seconds since epoch) of first sync
    pub created_at: i64,
}

impl From<MessageRecord> for FfiMessage {
    fn from(m: MessageRecord) -> Self {
        let is_unread = m.is_unread();
        Self {
            id: m.id.0,
            owner_email: m.owner_email,
            subject: m.subject,
            sender: m.sender,
            snippet: m.snippet,
            body: m.body,
            labels: m.labels.into_iter().collect(),
            is_unread,
            created_at: m.created_at.timestamp(),
        }
    }
}

/// A message to send
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiOutgoingMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub is_html: bool,
}

impl From<FfiOutgoingMessage> for OutgoingMessage {
    fn from(m: FfiOutgoingMessage) -> Self {
        OutgoingMessage {
            to: m.to,
            subject: m.subject,
            body: m.body,
            content_type: if m.is_html {
                ContentType::Html
            } else {
                ContentType::Plain
            },
        }
    }
}

/// Result of a mutation
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAck {
    pub message_id: String,
    /// False when there was no local row to update
    pub mirrored: bool,
}

impl From<Ack> for FfiAck {
    fn from(a: Ack) -> Self {
        Self {
            message_id: a.message_id.0,
            mirrored: a.mirrored,
        }
    }
}

// ============================================================================
// Sync Types
// ============================================================================

/// FFI-friendly sync statistics
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSyncStats {
    pub synced_count: u32,
    pub listed: u32,
    pub failed: u32,
    pub failed_ids: Vec<String>,
    pub duration_ms: u64,
}

impl From<SyncStats> for FfiSyncStats {
    fn from(s: SyncStats) -> Self {
        Self {
            synced_count: saturating_u32(s.synced_count),
            listed: saturating_u32(s.listed),
            failed: saturating_u32(s.failed),
            failed_ids: s.failed_ids.into_iter().map(|id| id.0).collect(),
            duration_ms: s.duration_ms,
        }
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Sync lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiSyncPhase {
    Idle,
    Refreshing,
    Fetching,
    Normalizing,
    Persisting,
    Completed,
    Failed,
}

impl From<SyncPhase> for FfiSyncPhase {
    fn from(p: SyncPhase) -> Self {
        match p {
            SyncPhase::Idle => FfiSyncPhase::Idle,
            SyncPhase::Refreshing => FfiSyncPhase::Refreshing,
            SyncPhase::Fetching => FfiSyncPhase::Fetching,
            SyncPhase::Normalizing => FfiSyncPhase::Normalizing,
            SyncPhase::Persisting => FfiSyncPhase::Persisting,
            SyncPhase::Completed => FfiSyncPhase::Completed,
            SyncPhase::Failed => FfiSyncPhase::Failed,
        }
    }
}

// ============================================================================
// Callback Traits
// ============================================================================

/// Callback interface for sync progress updates
#[uniffi::export(callback_interface)]
pub trait SyncProgressCallback: Send + Sync {
    /// Called on every phase transition
    fn on_phase(&self, phase: FfiSyncPhase);
    /// Called after each message detail fetch
    fn on_progress(&self, fetched: u32, total: u32);
}

/// Adapts a foreign progress callback to the sync observer
pub(crate) struct CallbackObserver(pub Box<dyn SyncProgressCallback>);

impl SyncObserver for CallbackObserver {
    fn on_phase(&self, _user_id: &str, phase: SyncPhase) {
        self.0.on_phase(phase.into());
    }

    fn on_fetch_progress(&self, _user_id: &str, done: usize, total: usize) {
        self.0.on_progress(saturating_u32(done), saturating_u32(total));
    }
}

// ============================================================================
// Log Callback
// ============================================================================

/// Log level for FFI callback
#[derive(Debug, Clone, Copy, uniffi::Enum)]
pub enum FfiLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<log::Level> for FfiLogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => FfiLogLevel::Error,
            log::Level::Warn => FfiLogLevel::Warn,
            log::Level::Info => FfiLogLevel::Info,
            log::Level::Debug => FfiLogLevel::Debug,
            log::Level::Trace => FfiLogLevel::Trace,
        }
    }
}

impl From<FfiLogLevel> for log::Level {
    fn from(level: FfiLogLevel) -> Self {
        match level {
            FfiLogLevel::Error => log::Level::Error,
            FfiLogLevel::Warn => log::Level::Warn,
            FfiLogLevel::Info => log::Level::Info,
            FfiLogLevel::Debug => log::Level::Debug,
            FfiLogLevel::Trace => log::Level::Trace,
        }
    }
}

/// Callback interface for receiving log messages from Rust
///
/// Swift should implement this using os_log/Logger for unified logging.
#[uniffi::export(callback_interface)]
pub trait LogCallback: Send + Sync {
    /// Called when a log message is emitted
    ///
    /// # Arguments
    /// * `level` - The log level (error, warn, info, debug, trace)
    /// * `target` - The logging target (typically module path, e.g., "mailmirror::sync")
    /// * `message` - The log message
    fn on_log(&self, level: FfiLogLevel, target: String, message: String);
}
