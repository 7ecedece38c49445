//! Mailbox credential model (owned by the auth layer, borrowed by sync)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Short-lived OAuth bearer token
///
/// `Debug` is redacted so tokens never end up in log output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

impl From<&str> for AccessToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AccessToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Stored OAuth credential for one user's mailbox
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct MailboxCredential {
    /// Identifier of the owning user in the auth layer
    pub user_id: String,
    /// Mailbox address, always lowercased
    pub email: String,
    /// Last access token obtained (may be expired)
    pub access_token: Option<String>,
    /// Long-lived refresh token, required to sync
    pub refresh_token: Option<String>,
}

impl MailboxCredential {
    pub fn new(user_id: impl Into<String>, email: impl AsRef<str>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.as_ref().trim().to_lowercase(),
            access_token: None,
            refresh_token: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self
    }

    /// The refresh token, if present and non-empty
    pub fn usable_refresh_token(&self) -> Option<&str> {
        self.refresh_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

impl fmt::Debug for MailboxCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxCredential")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}
