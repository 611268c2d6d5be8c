//! OAuth2 authorization server.
//!
//! Per-API authorization server implementing the authorization-code and
//! refresh-token grants with single-use codes and refresh-token rotation.
//! The consent UI is external: the public authorize endpoint validates the
//! request and 307-redirects to the configured login page; a trusted
//! backend later completes the authorization through the administrative
//! endpoint, supplying the session policy (`key_rules`) the minted tokens
//! will carry.

pub mod handlers;
pub mod manager;
pub mod types;

pub use manager::{AUTH_CODE_LIFETIME, ClientCredentials, OAuthManager};
pub use types::{AccessToken, AuthCode, OAuthClient, RefreshToken, TokenResponse};
