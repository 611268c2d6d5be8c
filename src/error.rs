//! Error types for the gateway core.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level gateway errors (startup, configuration, I/O)
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Request-rejection taxonomy surfaced by the middleware chain and the
/// OAuth2 endpoints.
///
/// The `Display` string of each variant is the *external* error text written
/// into the JSON response body. Variants that must not leak detail share the
/// generic malformed-auth line; logs carry the distinction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Authorization header missing, wrong shape, or unparseable
    #[error("Authorization field missing, malformed or invalid")]
    MalformedAuthHeader,

    /// Date header missing, unparseable, or outside the skew window
    #[error("Date is out of allowed range")]
    ClockSkew,

    /// Key not present in the key store. External text is deliberately the
    /// generic malformed-auth line.
    #[error("Authorization field missing, malformed or invalid")]
    UnknownKey,

    /// Key found but HMAC not enabled or the shared secret is empty
    #[error("This key is invalid")]
    KeyMisconfigured,

    /// Computed signature does not match the presented one
    #[error("Request signature is invalid")]
    SignatureMismatch,

    /// Session (or owning organisation) past its expiry
    #[error("Key has expired, please renew")]
    KeyExpired,

    /// Key exists but does not grant access to this API
    #[error("Access to this API has been disallowed")]
    AccessDenied,

    /// Per-key token bucket exhausted
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Per-key quota window exhausted
    #[error("Quota exceeded")]
    QuotaExceeded,

    /// Versioned API and no version named by the request
    #[error("Version information not found")]
    VersionNotFound,

    /// Requested version exists but is past its expiry date
    #[error("Requested API version has expired")]
    VersionExpired,

    /// Auth code or refresh token missing, expired, already used, or
    /// presented with a mismatched `redirect_uri`
    #[error("Invalid or expired authorization grant")]
    InvalidGrant,

    /// Client authentication failed against the stored client secret
    #[error("Client authentication failed")]
    InvalidClient,

    /// Grant type not allowed for this API or not implemented
    #[error("Unsupported grant type")]
    UnsupportedGrant,

    /// `response_type` not in the API's allowed authorize types
    #[error("Unsupported response type")]
    UnsupportedResponseType,

    /// `key_rules` did not decode into a session policy
    #[error("Key rules are malformed or invalid")]
    MalformedKeyRules,

    /// Administrative endpoint called without the node secret
    #[error("Attempted administrative access with invalid or missing key")]
    AdminAccessDenied,
}

impl AuthError {
    /// HTTP status written when this rejection terminates the chain.
    ///
    /// The signature/grant taxonomy is uniformly 400; expiry, rights, and
    /// admin-guard failures are 403 and rate limiting 429.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::KeyExpired | Self::AccessDenied | Self::QuotaExceeded | Self::AdminAccessDenied => {
                StatusCode::FORBIDDEN
            }
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
