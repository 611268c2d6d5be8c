//! Auth-failure reporting and outbound key-change notifications.
//!
//! Two side channels live here:
//!
//! - [`AuthFailureReporter`] emits a structured auth-failed event and
//!   records a `KeyFailure` health sample when a signature check fails.
//! - [`Notifier`] webhooks a trusted backend whenever a token is created,
//!   rotated, or revoked, so external keychains can stay in sync. Delivery
//!   is fire-and-forget; a failed POST is logged and dropped.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use crate::config::Notifications;
use crate::health::{HealthMetric, HealthReporter};

/// Notification command for a freshly minted access token.
pub const TOKEN_CREATED: &str = "oauth.token.created";
/// Notification command for a token replaced by a refresh exchange.
pub const TOKEN_ROTATED: &str = "oauth.token.rotated";
/// Notification command for a revoked access token.
pub const TOKEN_REVOKED: &str = "oauth.token.revoked";

/// Emits auth-failure events for one API.
pub struct AuthFailureReporter {
    health: Arc<HealthReporter>,
    api_id: String,
}

impl AuthFailureReporter {
    /// Create a reporter bound to an API id.
    #[must_use]
    pub fn new(health: Arc<HealthReporter>, api_id: &str) -> Self {
        Self {
            health,
            api_id: api_id.to_string(),
        }
    }

    /// Record a signature mismatch: auth-failed event plus a `KeyFailure`
    /// health sample.
    pub async fn signature_mismatch(&self, key_id: &str, path: &str) {
        warn!(
            event = "auth_failed",
            api_id = %self.api_id,
            key = %key_id,
            path = %path,
            "Request signature is invalid"
        );
        self.health.record(HealthMetric::KeyFailure).await;
    }
}

/// Posts key-change notifications to the configured webhook.
pub struct Notifier {
    client: reqwest::Client,
    config: Notifications,
}

impl Notifier {
    /// Create a notifier from an API's notification settings.
    #[must_use]
    pub fn new(config: Notifications) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Send one notification. A blank webhook URL disables delivery; errors
    /// never propagate to the request path.
    pub fn key_changed(&self, command: &'static str, token: &str) {
        if self.config.oauth_on_keychange_url.is_empty() {
            return;
        }

        let client = self.client.clone();
        let url = self.config.oauth_on_keychange_url.clone();
        let body = json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "command": command,
            "payload": token,
            "shared_secret": self.config.shared_secret,
        });

        tokio::spawn(async move {
            match client.post(&url).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(command, "Key-change notification delivered");
                }
                Ok(resp) => {
                    warn!(command, status = %resp.status(), "Key-change webhook rejected notification");
                }
                Err(e) => {
                    warn!(command, error = %e, "Key-change notification failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryKeyStore, KeyStore};

    #[tokio::test]
    async fn signature_mismatch_records_key_failure() {
        let store: Arc<dyn KeyStore> = Arc::new(InMemoryKeyStore::new());
        let health = Arc::new(HealthReporter::new(Arc::clone(&store), "999999"));
        let reporter = AuthFailureReporter::new(health, "999999");

        reporter.signature_mismatch("k1", "/APIID/").await;
        reporter.signature_mismatch("k1", "/APIID/").await;

        assert_eq!(
            store.get("apihealth.999999.KeyFailure").await.as_deref(),
            Some("2")
        );
    }

    #[tokio::test]
    async fn blank_webhook_url_is_a_no_op() {
        let notifier = Notifier::new(Notifications::default());
        // Must not panic or spawn anything that needs a live endpoint
        notifier.key_changed(TOKEN_CREATED, "tok");
    }
}
