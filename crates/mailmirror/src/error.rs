//! Typed failures surfaced by the sync pipeline and mutations
//!
//! Plumbing inside the crate uses `anyhow`; these enums are what crosses the
//! boundary to callers so each failure class can be handled exhaustively.

use thiserror::Error;

/// Refresh-token exchange failed
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("No refresh token to exchange")]
    MissingRefreshToken,

    /// The provider answered with an error status (revoked, expired, malformed)
    #[error("Refresh token rejected ({status}): {error}")]
    Rejected { status: u16, error: String },

    /// Network failure or unusable response body
    #[error("Token endpoint unreachable: {0}")]
    Transport(String),
}

/// Listing messages failed after a valid token was obtained
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to list messages for label {label}: {source:#}")]
    List {
        label: String,
        source: anyhow::Error,
    },

    #[error("All {count} message fetches failed")]
    AllDetailsFailed { count: usize },

    #[error("Fetch cancelled")]
    Cancelled,
}

/// Terminal sync failure
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("No mailbox credential for user {user_id}; reconnect the account")]
    NoCredential { user_id: String },

    #[error("Authentication failed: {0}")]
    Auth(#[source] RefreshError),

    #[error("Fetch failed: {0}")]
    Fetch(#[source] FetchError),

    #[error("Failed to persist messages: {0:#}")]
    Persistence(anyhow::Error),

    #[error("A sync is already running for {email}")]
    AlreadyRunning { email: String },

    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether the user has to re-consent rather than just retry
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, SyncError::NoCredential { .. } | SyncError::Auth(_))
    }
}

/// A delete/restore/permanent-delete/send could not be applied
#[derive(Debug, Error)]
pub enum MutationError {
    #[error("No mailbox credential for user {user_id}")]
    NoCredential { user_id: String },

    #[error("Authentication failed: {0}")]
    Auth(#[source] RefreshError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Reading the credential before any remote call failed
    #[error("Failed to read local store: {0:#}")]
    Store(anyhow::Error),

    /// The provider call failed; the local mirror was not touched
    #[error("Remote {action} failed: {source:#}")]
    Remote {
        action: &'static str,
        source: anyhow::Error,
    },

    /// The provider call succeeded but the local mirror could not be updated
    #[error("Local mirror update after {action} failed: {source:#}")]
    Mirror {
        action: &'static str,
        source: anyhow::Error,
    },
}
