//! Configuration management.
//!
//! The gateway configuration merges a YAML file with `TOLLGATE_`-prefixed
//! environment variables. API definitions use the same field names as the
//! JSON documents produced by the management layer, so a definition can also
//! be parsed directly from a JSON string with [`ApiSpec::from_json`].

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::oauth::OAuthClient;
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Node secret gating the administrative endpoints. Empty disables them.
    pub secret: String,
    /// API definitions served by this node
    pub apis: Vec<ApiSpec>,
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("TOLLGATE_").split("__"));

        figment.extract().map_err(|e| Error::Config(e.to_string()))
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Timeout applied to upstream requests
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Maximum request body size forwarded upstream (bytes)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// One API definition: listen path, auth mode, versioning, OAuth metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSpec {
    /// Human-readable API name
    pub name: String,
    /// Stable API identifier checked against session access rights
    pub api_id: String,
    /// Owning organisation id
    pub org_id: String,
    /// Where the request names its API version
    pub definition: VersionLocation,
    /// Auth header configuration
    pub auth: AuthConfig,
    /// Whether this API is protected by the OAuth2 middleware chain
    pub use_oauth2: bool,
    /// Whether this API requires HMAC request signatures
    pub enable_signature_checking: bool,
    /// Allowed clock skew for the signed `Date` header, in milliseconds.
    /// `<= 0` disables the check.
    pub hmac_allowed_clock_skew: i64,
    /// OAuth2 grant and authorize-type policy
    pub oauth_meta: OauthMeta,
    /// Registered OAuth2 clients, seeded into the key store at startup
    pub oauth_clients: Vec<OAuthClient>,
    /// Outbound key-change notification settings
    pub notifications: Notifications,
    /// Version table
    pub version_data: VersionData,
    /// Listen path and upstream target
    pub proxy: ProxyConfig,
}

impl ApiSpec {
    /// Parse an API definition from a JSON document.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Where the request carries its version name. Only header placement is
/// supported.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionLocation {
    /// Placement of the version value (`header`)
    pub location: String,
    /// Header name holding the version
    pub key: String,
}

impl Default for VersionLocation {
    fn default() -> Self {
        Self {
            location: "header".to_string(),
            key: "version".to_string(),
        }
    }
}

/// Auth header configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Header carrying the bearer credential
    pub auth_header_name: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            auth_header_name: "authorization".to_string(),
        }
    }
}

/// OAuth2 access-type policy for one API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OauthMeta {
    /// Grant types the token endpoint accepts
    pub allowed_access_types: Vec<AccessType>,
    /// Response types the authorize endpoints accept
    pub allowed_authorize_types: Vec<AuthorizeType>,
    /// Where the public authorize endpoint sends the user for consent
    pub auth_login_redirect: String,
    /// Access token lifetime in seconds
    pub access_token_ttl: u64,
    /// Refresh token lifetime in seconds
    pub refresh_token_ttl: u64,
}

impl Default for OauthMeta {
    fn default() -> Self {
        Self {
            allowed_access_types: Vec::new(),
            allowed_authorize_types: Vec::new(),
            auth_login_redirect: String::new(),
            access_token_ttl: 3600,
            refresh_token_ttl: 14 * 24 * 3600,
        }
    }
}

/// OAuth2 grant types recognised in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    /// Authorization-code grant
    AuthorizationCode,
    /// Refresh-token grant
    RefreshToken,
    /// Client-credentials grant (accepted in config, not served)
    ClientCredentials,
    /// Resource-owner password grant (accepted in config, not served)
    Password,
}

/// OAuth2 authorize response types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizeType {
    /// Authorization-code response
    Code,
    /// Implicit token response
    Token,
}

/// Outbound notification settings for key lifecycle events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Notifications {
    /// Shared secret included in every notification payload
    pub shared_secret: String,
    /// Webhook receiving token creation/rotation/revocation events.
    /// Empty disables notifications.
    pub oauth_on_keychange_url: String,
}

/// Version table for one API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionData {
    /// When set, version checking is skipped entirely
    pub not_versioned: bool,
    /// Known versions keyed by name
    pub versions: HashMap<String, VersionInfo>,
}

/// A single API version.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionInfo {
    /// Version name
    pub name: String,
    /// Expiry in `YYYY-MM-DD HH:MM` format; empty never expires
    pub expires: String,
}

/// Listen path and upstream target for one API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Path prefix this API answers on (e.g. `/payments/`)
    pub listen_path: String,
    /// Upstream base URL requests are forwarded to
    pub target_url: String,
    /// Whether to remove the listen path before forwarding
    pub strip_listen_path: bool,
}
