//! Per-API health counters.
//!
//! Health samples are short-lived counters recorded through the key store
//! under the `apihealth.` prefix, so an external poller (or another gateway
//! node sharing the store) can read them without extra plumbing. Counters
//! are windowed: each expires 60 seconds after its first sample.

use std::sync::Arc;
use std::time::Duration;

use crate::storage::{HEALTH_PREFIX, KeyStore};

/// Window after which an untouched counter resets.
const HEALTH_WINDOW: Duration = Duration::from_secs(60);

/// Health metrics recorded by the auth core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthMetric {
    /// A key failed authentication (bad signature, invalid key)
    KeyFailure,
    /// A request was rejected by the rate limiter
    ThrottleTriggered,
    /// A request was rejected by the quota check
    QuotaViolated,
}

impl HealthMetric {
    fn key(self) -> &'static str {
        match self {
            Self::KeyFailure => "KeyFailure",
            Self::ThrottleTriggered => "ThrottleTriggered",
            Self::QuotaViolated => "QuotaViolated",
        }
    }
}

/// Records health samples for one API.
pub struct HealthReporter {
    store: Arc<dyn KeyStore>,
    api_id: String,
}

impl HealthReporter {
    /// Create a reporter bound to an API id.
    #[must_use]
    pub fn new(store: Arc<dyn KeyStore>, api_id: &str) -> Self {
        Self {
            store,
            api_id: api_id.to_string(),
        }
    }

    /// Record one sample for `metric`, returning the count in the current
    /// window.
    pub async fn record(&self, metric: HealthMetric) -> i64 {
        let key = format!("{HEALTH_PREFIX}{}.{}", self.api_id, metric.key());
        self.store.incr(&key, Some(HEALTH_WINDOW)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryKeyStore;

    #[tokio::test]
    async fn samples_accumulate_under_health_prefix() {
        let store = Arc::new(InMemoryKeyStore::new());
        let reporter = HealthReporter::new(store.clone(), "999999");

        assert_eq!(reporter.record(HealthMetric::KeyFailure).await, 1);
        assert_eq!(reporter.record(HealthMetric::KeyFailure).await, 2);
        assert_eq!(
            store.get("apihealth.999999.KeyFailure").await.as_deref(),
            Some("2")
        );
    }

    #[tokio::test]
    async fn metrics_are_counted_separately() {
        let store = Arc::new(InMemoryKeyStore::new());
        let reporter = HealthReporter::new(store, "999999");

        reporter.record(HealthMetric::KeyFailure).await;
        assert_eq!(reporter.record(HealthMetric::QuotaViolated).await, 1);
        assert_eq!(reporter.record(HealthMetric::ThrottleTriggered).await, 1);
    }
}
