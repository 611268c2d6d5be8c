//! Version pinning for versioned APIs.

use std::sync::Arc;

use axum::http::request::Parts;
use chrono::{NaiveDateTime, Utc};
use tracing::{debug, warn};

use super::{Middleware, RequestContext, header_str};
use crate::config::ApiSpec;
use crate::error::AuthError;

/// Format of the `expires` field on a version entry.
const EXPIRY_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Rejects requests that name a missing or expired API version.
///
/// Non-versioned APIs pass unconditionally. The version name is read from
/// the header configured in the API definition.
pub struct VersionCheck {
    spec: Arc<ApiSpec>,
}

impl VersionCheck {
    /// Create a check for an API definition.
    #[must_use]
    pub fn new(spec: Arc<ApiSpec>) -> Self {
        Self { spec }
    }
}

#[async_trait::async_trait]
impl Middleware for VersionCheck {
    fn name(&self) -> &'static str {
        "version_check"
    }

    async fn process(&self, parts: &Parts, _ctx: &mut RequestContext) -> Result<(), AuthError> {
        if self.spec.version_data.not_versioned {
            return Ok(());
        }

        let Some(requested) = header_str(parts, &self.spec.definition.key) else {
            debug!(header = %self.spec.definition.key, "Version header missing");
            return Err(AuthError::VersionNotFound);
        };

        let Some(version) = self.spec.version_data.versions.get(requested) else {
            debug!(version = %requested, "Unknown API version requested");
            return Err(AuthError::VersionNotFound);
        };

        if version.expires.is_empty() {
            return Ok(());
        }

        match NaiveDateTime::parse_from_str(&version.expires, EXPIRY_FORMAT) {
            Ok(expires) if Utc::now().naive_utc() > expires => {
                debug!(version = %requested, "Requested API version has expired");
                Err(AuthError::VersionExpired)
            }
            Ok(_) => Ok(()),
            Err(e) => {
                // An unparseable expiry is a definition bug, not a client
                // error
                warn!(version = %requested, error = %e, "Could not parse version expiry");
                Ok(())
            }
        }
    }
}
