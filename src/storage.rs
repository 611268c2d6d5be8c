//! Key store — persistence seam for sessions, OAuth records, and counters.
//!
//! The [`KeyStore`] trait abstracts over storage backends. Production
//! deployments put a Redis-compatible implementation behind it; the crate
//! ships [`InMemoryKeyStore`], backed by a `DashMap` with per-entry TTLs and
//! a background reaper that evicts expired entries every 60 seconds.
//!
//! Values are stored as raw JSON strings, mirroring how the records live in
//! an external key/value store. All operations are atomic at single-key
//! granularity; [`KeyStore::take`] is the compare-and-swap equivalent used
//! for single-use consumption (refresh-token rotation).

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

/// Prefix for session records keyed by API key or access token.
pub const SESSION_PREFIX: &str = "apikey-";
/// Prefix for per-API health counters.
pub const HEALTH_PREFIX: &str = "apihealth.";
/// Prefix for organisation-level session records.
pub const ORG_PREFIX: &str = "orgKey.";
/// Prefix for per-key quota counters.
pub const QUOTA_PREFIX: &str = "quota-";
/// Prefix for registered OAuth2 clients.
pub const OAUTH_CLIENT_PREFIX: &str = "oauth-client.";
/// Prefix for outstanding authorization codes.
pub const OAUTH_CODE_PREFIX: &str = "oauth-code.";
/// Prefix for issued access tokens.
pub const OAUTH_TOKEN_PREFIX: &str = "oauth-token.";
/// Prefix for issued refresh tokens.
pub const OAUTH_REFRESH_PREFIX: &str = "oauth-refresh.";

/// Trait abstracting the key/value storage backend.
///
/// Implementations must be `Send + Sync` because the store is shared across
/// request tasks.
#[async_trait::async_trait]
pub trait KeyStore: Send + Sync + 'static {
    /// Look up a key. Returns `None` if absent or expired.
    async fn get(&self, key: &str) -> Option<String>;

    /// Set a key, replacing any existing value. `ttl` of `None` keeps the
    /// entry until deleted.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>);

    /// Delete a key. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> bool;

    /// Atomically remove and return a key's value.
    ///
    /// Exactly one of any number of concurrent callers observes the value;
    /// the rest get `None`. This is the primitive behind single-use
    /// credentials.
    async fn take(&self, key: &str) -> Option<String>;

    /// Atomically increment a counter key, creating it with `ttl` on first
    /// use (or after its window lapsed). Returns the post-increment count.
    async fn incr(&self, key: &str, ttl: Option<Duration>) -> i64;

    /// Remove all expired entries. Called periodically by the reaper.
    async fn reap_expired(&self) -> usize;
}

struct Entry {
    value: String,
    deadline: Option<Instant>,
}

impl Entry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            deadline: ttl.map(|t| Instant::now() + t),
        }
    }

    fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// In-memory key store backed by a `DashMap`.
///
/// Expired entries are evicted lazily on access and in bulk by the reaper.
pub struct InMemoryKeyStore {
    entries: DashMap<String, Entry>,
}

impl InMemoryKeyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl Default for InMemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn get(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            drop(entry);
            // Lazy eviction: remove on access
            self.entries.remove(key);
            debug!(key = %key, "Lazy-evicted expired entry");
            return None;
        }
        Some(entry.value.clone())
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) {
        self.entries.insert(key.to_string(), Entry::new(value, ttl));
    }

    async fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    async fn take(&self, key: &str) -> Option<String> {
        let (_, entry) = self.entries.remove(key)?;
        if entry.is_expired() {
            return None;
        }
        Some(entry.value)
    }

    async fn incr(&self, key: &str, ttl: Option<Duration>) -> i64 {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new("0".to_string(), ttl));

        if entry.is_expired() {
            // Window lapsed: restart the counter with a fresh deadline
            *entry = Entry::new("0".to_string(), ttl);
        }

        let count = entry.value.parse::<i64>().unwrap_or(0) + 1;
        entry.value = count.to_string();
        count
    }

    async fn reap_expired(&self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().is_expired())
            .map(|e| e.key().clone())
            .collect();

        let count = expired.len();
        for key in expired {
            self.entries.remove(&key);
        }
        count
    }
}

/// Spawn a background task that reaps expired entries every `interval`.
///
/// The task exits when the `shutdown` receiver fires.
pub fn spawn_reaper(
    store: Arc<dyn KeyStore>,
    interval: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reaped = store.reap_expired().await;
                    if reaped > 0 {
                        debug!(count = reaped, "Reaped expired key store entries");
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Key store reaper shutting down");
                    break;
                }
            }
        }
    });
}
