//! Per-key session policy records.
//!
//! A [`SessionState`] is the server-side record associated with an issued
//! credential: rate and quota limits, expiry, access rights, and the HMAC
//! shared secret. Instances are produced by a key-store lookup, attached to
//! the request context by the auth middleware, and never mutated afterwards.
//!
//! Field names match the wire JSON accepted by the administrative
//! `key_rules` parameter, so a policy blob round-trips unchanged through the
//! store.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Policy record for a single API key or OAuth2 access token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    /// Unix timestamp of the last rate-limit check
    pub last_check: i64,
    /// Burst allowance for the token bucket
    pub allowance: f64,
    /// Requests admitted per `per` seconds
    pub rate: f64,
    /// Length of the rate window in seconds
    pub per: f64,
    /// Unix timestamp after which the key is invalid; `<= 0` never expires
    pub expires: i64,
    /// Maximum requests per quota window; `-1` is unlimited
    pub quota_max: i64,
    /// Unix timestamp at which the quota window renews
    pub quota_renews: i64,
    /// Requests left in the current quota window
    pub quota_remaining: i64,
    /// Quota window length in seconds
    pub quota_renewal_rate: i64,
    /// API ids this key may call; empty means unrestricted
    pub access_rights: Vec<String>,
    /// Owning organisation id (empty when unscoped)
    pub org_id: String,
    /// OAuth2 client this session was minted for (empty for plain keys)
    pub oauth_client_id: String,
    /// Shared secret for HMAC signature checks (may be empty)
    pub hmac_string: String,
    /// Whether this key participates in HMAC signature checking
    pub hmac_enabled: bool,
}

impl SessionState {
    /// Decode a session from its stored JSON form.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Encode for storage.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Returns `true` if the key has passed its absolute expiry.
    #[must_use]
    pub fn is_expired(&self, now_unix: i64) -> bool {
        self.expires > 0 && now_unix > self.expires
    }

    /// Whether this key may call the given API. An empty rights list means
    /// the key is unrestricted.
    #[must_use]
    pub fn can_access(&self, api_id: &str) -> bool {
        self.access_rights.is_empty() || self.access_rights.iter().any(|a| a == api_id)
    }
}
