//! Token lookup for OAuth2-protected APIs.

use std::sync::Arc;

use axum::http::request::Parts;
use tracing::debug;

use super::{Middleware, RequestContext, header_str};
use crate::config::ApiSpec;
use crate::error::AuthError;
use crate::session::SessionState;
use crate::storage::{KeyStore, SESSION_PREFIX};

/// Resolves the bearer credential to a session and attaches it to the
/// request context.
///
/// Accepts both a bare token and a `Bearer <token>` header value. The
/// session for a minted OAuth2 access token lives under the same `apikey-`
/// prefix as plain API keys, so one lookup serves both.
pub struct TokenExists {
    spec: Arc<ApiSpec>,
    store: Arc<dyn KeyStore>,
}

impl TokenExists {
    /// Create a lookup bound to an API definition.
    #[must_use]
    pub fn new(spec: Arc<ApiSpec>, store: Arc<dyn KeyStore>) -> Self {
        Self { spec, store }
    }
}

#[async_trait::async_trait]
impl Middleware for TokenExists {
    fn name(&self) -> &'static str {
        "token_exists"
    }

    async fn process(&self, parts: &Parts, ctx: &mut RequestContext) -> Result<(), AuthError> {
        let Some(raw_header) = header_str(parts, &self.spec.auth.auth_header_name) else {
            debug!(path = %parts.uri.path(), "Auth header missing");
            return Err(AuthError::MalformedAuthHeader);
        };

        let token = raw_header
            .strip_prefix("Bearer ")
            .or_else(|| raw_header.strip_prefix("bearer "))
            .unwrap_or(raw_header);

        if token.is_empty() {
            return Err(AuthError::MalformedAuthHeader);
        }

        let Some(raw) = self.store.get(&format!("{SESSION_PREFIX}{token}")).await else {
            debug!(path = %parts.uri.path(), "Token not present in key store");
            return Err(AuthError::UnknownKey);
        };
        let session = SessionState::from_json(&raw).map_err(|_| AuthError::KeyMisconfigured)?;

        ctx.set_session_data(session);
        ctx.set_auth_header_value(token.to_string());
        Ok(())
    }
}
