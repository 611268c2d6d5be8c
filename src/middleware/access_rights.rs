//! API access-rights enforcement.

use std::sync::Arc;

use axum::http::request::Parts;
use tracing::debug;

use super::{Middleware, RequestContext};
use crate::config::ApiSpec;
use crate::error::AuthError;

/// Rejects keys whose access-rights list does not cover this API.
///
/// An empty list means the key is unrestricted.
pub struct AccessRightsCheck {
    spec: Arc<ApiSpec>,
}

impl AccessRightsCheck {
    /// Create a check bound to an API definition.
    #[must_use]
    pub fn new(spec: Arc<ApiSpec>) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl Middleware for AccessRightsCheck {
    fn name(&self) -> &'static str {
        "access_rights"
    }

    async fn process(&self, parts: &Parts, ctx: &mut RequestContext) -> Result<(), AuthError> {
        let Some(session) = ctx.session_data() else {
            return Err(AuthError::UnknownKey);
        };

        if !session.can_access(&self.spec.api_id) {
            debug!(
                path = %parts.uri.path(),
                api_id = %self.spec.api_id,
                "Key does not have access to this API"
            );
            return Err(AuthError::AccessDenied);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use axum::http::Request;

    fn check_for(api_id: &str) -> AccessRightsCheck {
        AccessRightsCheck::new(Arc::new(ApiSpec {
            api_id: api_id.to_string(),
            ..ApiSpec::default()
        }))
    }

    fn empty_parts() -> Parts {
        Request::builder().uri("/").body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn unrestricted_key_passes() {
        let mut ctx = RequestContext::default();
        ctx.set_session_data(SessionState::default());
        assert!(
            check_for("999999")
                .process(&empty_parts(), &mut ctx)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn listed_api_passes() {
        let mut ctx = RequestContext::default();
        ctx.set_session_data(SessionState {
            access_rights: vec!["999999".to_string()],
            ..SessionState::default()
        });
        assert!(
            check_for("999999")
                .process(&empty_parts(), &mut ctx)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn unlisted_api_rejects() {
        let mut ctx = RequestContext::default();
        ctx.set_session_data(SessionState {
            access_rights: vec!["111111".to_string()],
            ..SessionState::default()
        });
        assert_eq!(
            check_for("999999")
                .process(&empty_parts(), &mut ctx)
                .await
                .unwrap_err(),
            AuthError::AccessDenied
        );
    }
}
