//! HTTP router: per-API sub-routers merged into one application.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::error;

use super::proxy::UpstreamProxy;
use crate::config::{ApiSpec, ServerConfig};
use crate::events::{AuthFailureReporter, Notifier};
use crate::health::HealthReporter;
use crate::hmac::HmacVerifier;
use crate::middleware::access_rights::AccessRightsCheck;
use crate::middleware::key_expired::KeyExpired;
use crate::middleware::rate_quota::RateLimitAndQuotaCheck;
use crate::middleware::token_exists::TokenExists;
use crate::middleware::version_check::VersionCheck;
use crate::middleware::{Chain, Middleware, RequestContext};
use crate::oauth::OAuthManager;
use crate::oauth::handlers as oauth_handlers;
use crate::storage::KeyStore;

/// Everything one API needs to serve traffic: its definition, middleware
/// chain, authorization server, and upstream forwarder.
pub struct ApiHandle {
    /// The API definition
    pub spec: Arc<ApiSpec>,
    /// Ordered middleware chain run for proxied requests
    pub chain: Chain,
    /// Node secret gating the administrative endpoints
    pub node_secret: String,
    oauth: OAuthManager,
    proxy: UpstreamProxy,
}

impl ApiHandle {
    /// The API's OAuth2 authorization server.
    #[must_use]
    pub fn oauth(&self) -> &OAuthManager {
        &self.oauth
    }
}

/// Assemble an [`ApiHandle`] from a definition.
///
/// The chain follows the canonical order: version check, then the auth
/// link (HMAC verifier or OAuth token lookup), then expiry, access rights,
/// and rate/quota.
#[must_use]
pub fn build_api(
    spec: ApiSpec,
    store: Arc<dyn KeyStore>,
    node_secret: &str,
    server: &ServerConfig,
) -> Arc<ApiHandle> {
    let spec = Arc::new(spec);
    let health = Arc::new(HealthReporter::new(Arc::clone(&store), &spec.api_id));
    let reporter = Arc::new(AuthFailureReporter::new(
        Arc::clone(&health),
        &spec.api_id,
    ));
    let notifier = Arc::new(Notifier::new(spec.notifications.clone()));

    let mut links: Vec<Arc<dyn Middleware>> =
        vec![Arc::new(VersionCheck::new(Arc::clone(&spec)))];
    if spec.enable_signature_checking {
        links.push(Arc::new(HmacVerifier::new(
            Arc::clone(&spec),
            Arc::clone(&store),
            reporter,
        )));
    } else if spec.use_oauth2 {
        links.push(Arc::new(TokenExists::new(
            Arc::clone(&spec),
            Arc::clone(&store),
        )));
    }
    links.push(Arc::new(KeyExpired::new(Arc::clone(&store))));
    links.push(Arc::new(AccessRightsCheck::new(Arc::clone(&spec))));
    links.push(Arc::new(RateLimitAndQuotaCheck::new(
        Arc::clone(&store),
        health,
    )));

    let oauth = OAuthManager::new(Arc::clone(&spec), Arc::clone(&store), notifier);

    Arc::new(ApiHandle {
        chain: Chain::new(links),
        node_secret: node_secret.to_string(),
        oauth,
        proxy: UpstreamProxy::new(server.request_timeout, server.max_body_size),
        spec,
    })
}

/// Build the application router from the registered APIs.
#[must_use]
pub fn create_router(apis: &[Arc<ApiHandle>]) -> Router {
    let mut router = Router::new().route("/health", get(health_handler));
    for api in apis {
        router = router.merge(api_routes(Arc::clone(api)));
    }
    router.layer(TraceLayer::new_for_http())
}

fn api_routes(api: Arc<ApiHandle>) -> Router {
    let listen = api.spec.proxy.listen_path.trim_end_matches('/').to_string();
    let mut router = Router::new();

    if api.spec.use_oauth2 {
        router = router
            .route(
                &format!("{listen}/oauth/authorize/"),
                get(oauth_handlers::authorize).post(oauth_handlers::authorize),
            )
            .route(&format!("{listen}/oauth/token/"), post(oauth_handlers::token))
            .route(
                &format!("{listen}/tyk/oauth/authorize-client/"),
                post(oauth_handlers::authorize_client),
            );
    }

    router
        .route(&format!("{listen}/"), any(protected_handler))
        .route(&format!("{listen}/{{*path}}"), any(protected_handler))
        .with_state(api)
}

/// GET /health — liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// Terminal handler for protected paths: run the chain, then forward.
async fn protected_handler(State(api): State<Arc<ApiHandle>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let mut ctx = RequestContext::default();
    if let Err(err) = api.chain.run(&parts, &mut ctx).await {
        return err.into_response();
    }

    match api.proxy.forward(&api.spec, &parts, body).await {
        Ok(response) => response,
        Err(err) => {
            error!(api_id = %api.spec.api_id, error = %err, "Upstream request failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "Upstream request failed" })),
            )
                .into_response()
        }
    }
}
