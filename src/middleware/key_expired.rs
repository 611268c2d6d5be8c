//! Session and organisation expiry checks.

use std::sync::Arc;

use axum::http::request::Parts;
use chrono::Utc;
use tracing::debug;

use super::{Middleware, RequestContext};
use crate::error::AuthError;
use crate::session::SessionState;
use crate::storage::{KeyStore, ORG_PREFIX};

/// Rejects sessions (or their owning organisation) past their expiry.
///
/// Requires an auth link earlier in the chain to have attached the session.
pub struct KeyExpired {
    store: Arc<dyn KeyStore>,
}

impl KeyExpired {
    /// Create an expiry check backed by the shared key store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Middleware for KeyExpired {
    fn name(&self) -> &'static str {
        "key_expired"
    }

    async fn process(&self, parts: &Parts, ctx: &mut RequestContext) -> Result<(), AuthError> {
        let Some(session) = ctx.session_data() else {
            return Err(AuthError::UnknownKey);
        };

        let now = Utc::now().timestamp();
        if session.is_expired(now) {
            debug!(path = %parts.uri.path(), "Session key has expired");
            return Err(AuthError::KeyExpired);
        }

        // A closed organisation invalidates all of its keys at once
        if !session.org_id.is_empty() {
            let org_key = format!("{ORG_PREFIX}{}", session.org_id);
            if let Some(raw) = self.store.get(&org_key).await {
                let org = SessionState::from_json(&raw).unwrap_or_default();
                if org.is_expired(now) {
                    debug!(org = %session.org_id, "Organisation has expired");
                    return Err(AuthError::KeyExpired);
                }
            }
        }

        Ok(())
    }
}
