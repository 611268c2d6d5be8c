//! HMAC request-signature verification.
//!
//! Admits requests carrying an `Authorization: Signature …` header signed
//! with a per-key shared secret. The pipeline:
//!
//! 1. Require `Authorization` and `Date` headers
//! 2. Check the `Date` header against the clock-skew window ([`clock`])
//! 3. Decompose the header into key id / algorithm / signature ([`parser`])
//! 4. Look up the key's session in the key store
//! 5. Attach session and key id to the request context
//! 6. Reject keys without HMAC enabled or with an empty secret
//! 7. Recompute the signature ([`signer`]) and compare constant-time
//!
//! On a signature mismatch the auth-failure reporter fires before the
//! rejection is returned.

pub mod clock;
pub mod parser;
pub mod signer;

use std::sync::Arc;

use axum::http::request::Parts;
use tracing::{debug, info, warn};

pub use parser::ParsedSignature;

use crate::config::ApiSpec;
use crate::error::AuthError;
use crate::events::AuthFailureReporter;
use crate::middleware::{Middleware, RequestContext, header_str};
use crate::session::SessionState;
use crate::storage::{KeyStore, SESSION_PREFIX};

/// Name of the signed date header.
pub const DATE_HEADER: &str = "Date";

/// Middleware enforcing HMAC request signatures for one API.
pub struct HmacVerifier {
    spec: Arc<ApiSpec>,
    store: Arc<dyn KeyStore>,
    reporter: Arc<AuthFailureReporter>,
}

impl HmacVerifier {
    /// Create a verifier bound to an API definition.
    #[must_use]
    pub fn new(
        spec: Arc<ApiSpec>,
        store: Arc<dyn KeyStore>,
        reporter: Arc<AuthFailureReporter>,
    ) -> Self {
        Self {
            spec,
            store,
            reporter,
        }
    }

    fn authorization_error(&self, parts: &Parts) -> AuthError {
        info!(
            path = %parts.uri.path(),
            "Authorization field missing or malformed"
        );
        AuthError::MalformedAuthHeader
    }
}

#[async_trait::async_trait]
impl Middleware for HmacVerifier {
    fn name(&self) -> &'static str {
        "hmac_verifier"
    }

    async fn process(&self, parts: &Parts, ctx: &mut RequestContext) -> Result<(), AuthError> {
        let Some(auth_header) = header_str(parts, "authorization") else {
            return Err(self.authorization_error(parts));
        };

        let Some(date_header) = header_str(parts, DATE_HEADER) else {
            debug!("Date missing");
            return Err(self.authorization_error(parts));
        };

        if !clock::check(date_header, self.spec.hmac_allowed_clock_skew) {
            info!(path = %parts.uri.path(), "Date is out of allowed range");
            return Err(AuthError::ClockSkew);
        }

        let parsed = parser::parse(auth_header)?;

        let session_key = format!("{SESSION_PREFIX}{}", parsed.key_id);
        let Some(raw) = self.store.get(&session_key).await else {
            debug!(key = %parsed.key_id, "Key not found in session store");
            return Err(AuthError::UnknownKey);
        };
        let session = SessionState::from_json(&raw).map_err(|_| AuthError::KeyMisconfigured)?;

        // Attach before the policy checks so downstream error handling can
        // still see who was knocking
        ctx.set_session_data(session.clone());
        ctx.set_auth_header_value(parsed.key_id.clone());

        if !session.hmac_enabled || session.hmac_string.is_empty() {
            warn!(
                path = %parts.uri.path(),
                key = %parsed.key_id,
                "API requires HMAC signature, session missing secret or HMAC not enabled"
            );
            return Err(AuthError::KeyMisconfigured);
        }

        let expected = signer::sign(date_header, &session.hmac_string);
        let presented = signer::query_unescape(&parsed.signature)?;

        if !signer::matches(&expected, &presented) {
            self.reporter
                .signature_mismatch(&parsed.key_id, parts.uri.path())
                .await;
            return Err(AuthError::SignatureMismatch);
        }

        debug!(key = %parsed.key_id, "Signature matches");
        Ok(())
    }
}
