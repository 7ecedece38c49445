//! Gmail OAuth2 refresh-token exchange
//!
//! The consent flow that first produces a refresh token belongs to the auth
//! layer. This module only trades a stored refresh token for a fresh access
//! token. Uses synchronous HTTP (ureq) to be executor-agnostic.

use std::time::Duration;

use log::{debug, warn};
use serde::Deserialize;

use crate::config::GmailCredentials;
use crate::error::RefreshError;
use crate::models::AccessToken;

/// Exchanges refresh tokens for access tokens
pub trait TokenRefresher: Send + Sync {
    /// Obtain a new access token. No retry: a rejected token needs re-consent.
    fn refresh(&self, refresh_token: &str) -> Result<AccessToken, RefreshError>;
}

/// Token response from Google
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[allow(dead_code)]
    expires_in: Option<u64>,
    #[allow(dead_code)]
    token_type: Option<String>,
}

/// Error body from Google's token endpoint
#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

/// OAuth2 client for Google's token endpoint
pub struct GmailAuth {
    client_id: String,
    client_secret: String,
    token_url: String,
    agent: ureq::Agent,
}

impl GmailAuth {
    /// Google OAuth2 token endpoint
    const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    /// Create a new GmailAuth instance
    ///
    /// # Arguments
    /// * `credentials` - OAuth2 client ID and secret
    /// * `timeout` - Upper bound for the whole token request
    pub fn new(credentials: &GmailCredentials, timeout: Duration) -> Self {
        // Error statuses are inspected so the provider's reason can be reported
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            token_url: Self::TOKEN_URL.to_string(),
            agent,
        }
    }

    /// Point the client at a different token endpoint (emulators, tests)
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }
}

impl TokenRefresher for GmailAuth {
    fn refresh(&self, refresh_token: &str) -> Result<AccessToken, RefreshError> {
        let refresh_token = refresh_token.trim();
        if refresh_token.is_empty() {
            return Err(RefreshError::MissingRefreshToken);
        }

        debug!("Exchanging refresh token at {}", self.token_url);

        let mut response = self
            .agent
            .post(&self.token_url)
            .send_form([
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .map_err(|e| {
                RefreshError::Transport(format!("Failed to refresh access token: {}", e))
            })?;

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| RefreshError::Transport(format!("Failed to read token response: {}", e)))?;

        interpret_token_response(status, &body)
    }
}

/// Turn a token endpoint status and body into an access token or a typed error
fn interpret_token_response(status: u16, body: &str) -> Result<AccessToken, RefreshError> {
    if !(200..300).contains(&status) {
        let parsed: TokenErrorResponse = serde_json::from_str(body).unwrap_or_default();
        let error = match (parsed.error, parsed.error_description) {
            (Some(code), Some(desc)) => format!("{}: {}", code, desc),
            (Some(code), None) => code,
            (None, Some(desc)) => desc,
            (None, None) => "unknown error".to_string(),
        };
        warn!("Token endpoint rejected refresh ({}): {}", status, error);
        return Err(RefreshError::Rejected { status, error });
    }

    let token: TokenResponse = serde_json::from_str(body)
        .map_err(|e| RefreshError::Transport(format!("Failed to parse token response: {}", e)))?;

    match token.access_token {
        Some(access_token) if !access_token.is_empty() => Ok(AccessToken::new(access_token)),
        _ => Err(RefreshError::Transport(
            "Token response did not include an access_token".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successful_exchange() {
        let body = r#"{
            "access_token": "ya29.new",
            "expires_in": 3599,
            "scope": "https://www.googleapis.com/auth/gmail.modify",
            "token_type": "Bearer"
        }"#;

        let token = interpret_token_response(200, body).unwrap();
        assert_eq!(token.as_str(), "ya29.new");
    }

    #[test]
    fn test_revoked_token_is_rejected() {
        let body = r#"{"error": "invalid_grant", "error_description": "Token has been expired or revoked."}"#;

        match interpret_token_response(400, body) {
            Err(RefreshError::Rejected { status, error }) => {
                assert_eq!(status, 400);
                assert!(error.starts_with("invalid_grant"));
            }
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[test]
    fn test_error_status_with_unparseable_body() {
        match interpret_token_response(502, "<html>bad gateway</html>") {
            Err(RefreshError::Rejected { status, error }) => {
                assert_eq!(status, 502);
                assert_eq!(error, "unknown error");
            }
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_access_token() {
        let result = interpret_token_response(200, r#"{"token_type": "Bearer"}"#);
        assert!(matches!(result, Err(RefreshError::Transport(_))));
    }

    #[test]
    fn test_empty_refresh_token_skips_network() {
        let creds = GmailCredentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
        };
        // Unroutable endpoint: the call must never be attempted
        let auth = GmailAuth::new(&creds, Duration::from_millis(10))
            .with_token_url("http://127.0.0.1:9/token");

        assert!(matches!(
            auth.refresh("  "),
            Err(RefreshError::MissingRefreshToken)
        ));
    }
}
