//! Per-key rate limiting and quota enforcement.
//!
//! Rate limits are token buckets (`rate` requests per `per` seconds with an
//! `allowance` burst) held in-process, one limiter per key, lazily built
//! from the session and rebuilt when its policy changes. Quotas count
//! requests through the key store's atomic increment so concurrent workers
//! (and other gateway nodes sharing the store) see one consistent window.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::http::request::Parts;
use dashmap::DashMap;
use governor::{Quota, RateLimiter as GovernorLimiter};
use tracing::debug;

use super::{Middleware, RequestContext};
use crate::error::AuthError;
use crate::health::{HealthMetric, HealthReporter};
use crate::session::SessionState;
use crate::storage::{KeyStore, QUOTA_PREFIX};

type DirectLimiter = GovernorLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

struct KeyLimiter {
    rate: f64,
    per: f64,
    allowance: f64,
    limiter: DirectLimiter,
}

impl KeyLimiter {
    fn build(session: &SessionState) -> Self {
        let period = Duration::from_secs_f64(session.per / session.rate);
        let burst = NonZeroU32::new(session.allowance as u32).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst);

        Self {
            rate: session.rate,
            per: session.per,
            allowance: session.allowance,
            limiter: GovernorLimiter::direct(quota),
        }
    }

    fn matches(&self, session: &SessionState) -> bool {
        self.rate == session.rate && self.per == session.per && self.allowance == session.allowance
    }
}

/// Enforces the session's rate and quota policy.
pub struct RateLimitAndQuotaCheck {
    store: Arc<dyn KeyStore>,
    health: Arc<HealthReporter>,
    limiters: DashMap<String, Arc<KeyLimiter>>,
}

impl RateLimitAndQuotaCheck {
    /// Create a check backed by the shared key store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyStore>, health: Arc<HealthReporter>) -> Self {
        Self {
            store,
            health,
            limiters: DashMap::new(),
        }
    }

    fn limiter_for(&self, key: &str, session: &SessionState) -> Arc<KeyLimiter> {
        if let Some(existing) = self.limiters.get(key) {
            if existing.matches(session) {
                return Arc::clone(&existing);
            }
        }
        let built = Arc::new(KeyLimiter::build(session));
        self.limiters.insert(key.to_string(), Arc::clone(&built));
        built
    }
}

#[async_trait::async_trait]
impl Middleware for RateLimitAndQuotaCheck {
    fn name(&self) -> &'static str {
        "rate_limit_and_quota"
    }

    async fn process(&self, parts: &Parts, ctx: &mut RequestContext) -> Result<(), AuthError> {
        let (Some(session), Some(key)) = (ctx.session_data(), ctx.auth_header_value()) else {
            return Err(AuthError::UnknownKey);
        };

        if session.rate > 0.0 && session.per > 0.0 {
            let limiter = self.limiter_for(key, session);
            if limiter.limiter.check().is_err() {
                debug!(path = %parts.uri.path(), "Rate limit exceeded");
                self.health.record(HealthMetric::ThrottleTriggered).await;
                return Err(AuthError::RateLimitExceeded);
            }
        }

        if session.quota_max >= 0 {
            let window = Duration::from_secs(session.quota_renewal_rate.max(1) as u64);
            let used = self
                .store
                .incr(&format!("{QUOTA_PREFIX}{key}"), Some(window))
                .await;
            if used > session.quota_max {
                debug!(path = %parts.uri.path(), used, max = session.quota_max, "Quota exceeded");
                self.health.record(HealthMetric::QuotaViolated).await;
                return Err(AuthError::QuotaExceeded);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryKeyStore;
    use axum::http::Request;

    fn empty_parts() -> Parts {
        Request::builder().uri("/").body(()).unwrap().into_parts().0
    }

    fn check_with_store(store: Arc<dyn KeyStore>) -> RateLimitAndQuotaCheck {
        let health = Arc::new(HealthReporter::new(Arc::clone(&store), "test-api"));
        RateLimitAndQuotaCheck::new(store, health)
    }

    fn ctx_with(session: SessionState) -> RequestContext {
        let mut ctx = RequestContext::default();
        ctx.set_session_data(session);
        ctx.set_auth_header_value("key-1".to_string());
        ctx
    }

    #[tokio::test]
    async fn missing_context_rejects() {
        let check = check_with_store(Arc::new(InMemoryKeyStore::new()));
        let mut ctx = RequestContext::default();
        assert_eq!(
            check.process(&empty_parts(), &mut ctx).await.unwrap_err(),
            AuthError::UnknownKey
        );
    }

    #[tokio::test]
    async fn unlimited_session_passes() {
        let check = check_with_store(Arc::new(InMemoryKeyStore::new()));
        let mut ctx = ctx_with(SessionState {
            quota_max: -1,
            ..SessionState::default()
        });
        for _ in 0..10 {
            assert!(check.process(&empty_parts(), &mut ctx).await.is_ok());
        }
    }

    #[tokio::test]
    async fn burst_exhaustion_trips_rate_limit() {
        let store: Arc<dyn KeyStore> = Arc::new(InMemoryKeyStore::new());
        let check = check_with_store(Arc::clone(&store));
        let mut ctx = ctx_with(SessionState {
            rate: 1.0,
            per: 60.0,
            allowance: 1.0,
            quota_max: -1,
            ..SessionState::default()
        });

        assert!(check.process(&empty_parts(), &mut ctx).await.is_ok());
        assert_eq!(
            check.process(&empty_parts(), &mut ctx).await.unwrap_err(),
            AuthError::RateLimitExceeded
        );
        // Throttle event recorded in the health window
        assert_eq!(
            store
                .get("apihealth.test-api.ThrottleTriggered")
                .await
                .as_deref(),
            Some("1")
        );
    }

    #[tokio::test]
    async fn quota_exhaustion_rejects() {
        let store: Arc<dyn KeyStore> = Arc::new(InMemoryKeyStore::new());
        let check = check_with_store(Arc::clone(&store));
        let mut ctx = ctx_with(SessionState {
            quota_max: 2,
            quota_renewal_rate: 300,
            ..SessionState::default()
        });

        assert!(check.process(&empty_parts(), &mut ctx).await.is_ok());
        assert!(check.process(&empty_parts(), &mut ctx).await.is_ok());
        assert_eq!(
            check.process(&empty_parts(), &mut ctx).await.unwrap_err(),
            AuthError::QuotaExceeded
        );
        assert_eq!(
            store
                .get("apihealth.test-api.QuotaViolated")
                .await
                .as_deref(),
            Some("1")
        );
    }

    #[tokio::test]
    async fn limiter_rebuilds_when_policy_changes() {
        let check = check_with_store(Arc::new(InMemoryKeyStore::new()));

        let mut ctx = ctx_with(SessionState {
            rate: 1.0,
            per: 60.0,
            allowance: 1.0,
            quota_max: -1,
            ..SessionState::default()
        });
        assert!(check.process(&empty_parts(), &mut ctx).await.is_ok());
        assert!(check.process(&empty_parts(), &mut ctx).await.is_err());

        // A raised allowance takes effect immediately
        let mut ctx = ctx_with(SessionState {
            rate: 1.0,
            per: 60.0,
            allowance: 10.0,
            quota_max: -1,
            ..SessionState::default()
        });
        assert!(check.process(&empty_parts(), &mut ctx).await.is_ok());
    }
}
