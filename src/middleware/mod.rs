//! Ordered middleware pipeline.
//!
//! Every link implements [`Middleware`] with a uniform contract: inspect the
//! request head and the request-scoped [`RequestContext`], return `Ok(())`
//! to let the chain proceed or an [`AuthError`] to short-circuit. The first
//! error terminates the [`Chain`] and becomes the HTTP response; no link
//! swallows another's failure.
//!
//! For OAuth2-protected APIs the canonical order is version check, token
//! lookup, expiry, access rights, then rate/quota, with the upstream
//! forwarder as the terminal handler.

pub mod access_rights;
pub mod context;
pub mod key_expired;
pub mod rate_quota;
pub mod token_exists;
pub mod version_check;

use std::sync::Arc;

use axum::http::request::Parts;
use tracing::debug;

pub use context::RequestContext;

use crate::error::AuthError;

/// A single link in the request-processing chain.
#[async_trait::async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Run this link's checks. Returning an error halts the chain.
    async fn process(&self, parts: &Parts, ctx: &mut RequestContext) -> Result<(), AuthError>;
}

/// An ordered sequence of middleware, run per request.
pub struct Chain {
    links: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    /// Build a chain from its links, in execution order.
    #[must_use]
    pub fn new(links: Vec<Arc<dyn Middleware>>) -> Self {
        Self { links }
    }

    /// Run every link in order, stopping at the first failure.
    pub async fn run(&self, parts: &Parts, ctx: &mut RequestContext) -> Result<(), AuthError> {
        for link in &self.links {
            if let Err(err) = link.process(parts, ctx).await {
                debug!(middleware = link.name(), error = %err, "Chain halted");
                return Err(err);
            }
        }
        Ok(())
    }
}

/// Read a header as a string slice, if present and valid.
pub(crate) fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}
