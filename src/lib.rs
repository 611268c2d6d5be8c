//! Tollgate — authentication core for an HTTP API gateway.
//!
//! Gates inbound traffic before it is forwarded to an upstream target:
//!
//! - **HMAC request signatures**: `Authorization: Signature …` headers
//!   verified with HMAC-SHA1 against per-key shared secrets, with a
//!   configurable clock-skew window on the signed `Date` header.
//! - **OAuth2 authorization server**: authorize, token, and administrative
//!   client-authorization endpoints, with single-use auth codes and
//!   refresh-token rotation.
//! - **Middleware chain**: version pinning, token lookup, expiry, access
//!   rights, and rate/quota checks composed as an ordered pipeline that
//!   short-circuits on the first failure.
//!
//! Sessions, tokens, and counters live behind the [`storage::KeyStore`]
//! seam; the in-memory implementation ships here and a shared external
//! store can be slotted in without touching the middleware.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod health;
pub mod hmac;
pub mod middleware;
pub mod oauth;
pub mod session;
pub mod storage;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
