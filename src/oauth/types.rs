//! OAuth2 record types persisted in the key store.

use serde::{Deserialize, Serialize};

use crate::session::SessionState;

/// A registered OAuth2 client. Registrations come from API configuration
/// and are seeded into the key store at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthClient {
    /// Public client identifier
    pub client_id: String,
    /// Client secret checked at the token endpoint
    pub secret: String,
    /// The only redirect URI this client may use
    pub redirect_uri: String,
    /// Policy applied to sessions minted for this client
    pub policy_id: String,
}

/// A single-use authorization code bridging the authorize and token steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthCode {
    /// The code value handed to the client
    pub code: String,
    /// Client the code was issued to
    pub client_id: String,
    /// Redirect URI presented at authorize time; the token exchange must
    /// present it byte-for-byte
    pub redirect_uri: String,
    /// Unix timestamp after which the code is treated as nonexistent
    pub expires_at: i64,
    /// Session policy the minted tokens will carry
    pub user_data: SessionState,
}

impl AuthCode {
    /// Whether the code has passed its expiry.
    #[must_use]
    pub fn is_expired(&self, now_unix: i64) -> bool {
        now_unix >= self.expires_at
    }
}

/// An issued access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    /// Opaque token value
    pub token: String,
    /// Client the token belongs to
    pub client_id: String,
    /// Linked refresh token, when the grant carries one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix timestamp after which the token is invalid
    pub expires_at: i64,
}

/// An issued refresh token. Single-use: consumed on exchange and replaced
/// by a fresh one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    /// Opaque token value
    pub token: String,
    /// Client the token belongs to
    pub client_id: String,
    /// Access token this refresh token rotates out
    pub linked_access_token: String,
    /// Session policy carried over to the replacement tokens
    pub session: SessionState,
}

/// Token endpoint response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The minted access token
    pub access_token: String,
    /// Always `bearer`
    pub token_type: String,
    /// Seconds until the access token expires
    pub expires_in: u64,
    /// Replacement refresh token, when the grant carries one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}
