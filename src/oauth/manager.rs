//! OAuth2 grant state machines.
//!
//! One [`OAuthManager`] serves one API definition. It owns no request
//! handling; the axum handlers in [`super::handlers`] translate HTTP into
//! calls here.
//!
//! Grant flow for the authorization-code grant:
//!
//! ```text
//! authorize valid      -> code issued (10 minute TTL, single use)
//! exchange succeeds    -> tokens issued, code deleted
//! exchange fails       -> code left in place until its TTL lapses
//! refresh valid        -> new token pair, presented refresh token consumed
//! ```
//!
//! The refresh-token rotation race is decided by the key store's atomic
//! `take`: of any number of concurrent exchanges presenting the same
//! refresh token, exactly one wins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use url::form_urlencoded;

use super::types::{AccessToken, AuthCode, OAuthClient, RefreshToken, TokenResponse};
use crate::config::{ApiSpec, AuthorizeType};
use crate::error::AuthError;
use crate::events::{Notifier, TOKEN_CREATED, TOKEN_REVOKED, TOKEN_ROTATED};
use crate::session::SessionState;
use crate::storage::{
    KeyStore, OAUTH_CLIENT_PREFIX, OAUTH_CODE_PREFIX, OAUTH_REFRESH_PREFIX, OAUTH_TOKEN_PREFIX,
    SESSION_PREFIX,
};

/// Authorization codes live at most ten minutes.
pub const AUTH_CODE_LIFETIME: Duration = Duration::from_secs(600);

/// Client credentials extracted from HTTP Basic authentication.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    /// Client identifier
    pub client_id: String,
    /// Client secret
    pub secret: String,
}

/// Generate an opaque credential: 32 random bytes, URL-safe base64.
fn generate_token() -> String {
    let random_bytes: [u8; 32] = rand::rng().random();
    base64::Engine::encode(
        &base64::engine::general_purpose::URL_SAFE_NO_PAD,
        random_bytes,
    )
}

/// Read a non-empty form parameter.
fn param<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params.get(name).map(String::as_str).filter(|v| !v.is_empty())
}

/// OAuth2 authorization server for one API.
pub struct OAuthManager {
    spec: Arc<ApiSpec>,
    store: Arc<dyn KeyStore>,
    notifier: Arc<Notifier>,
}

impl OAuthManager {
    /// Create a manager bound to an API definition.
    #[must_use]
    pub fn new(spec: Arc<ApiSpec>, store: Arc<dyn KeyStore>, notifier: Arc<Notifier>) -> Self {
        Self {
            spec,
            store,
            notifier,
        }
    }

    /// Seed the configured client registrations into the key store.
    pub async fn seed_clients(&self) {
        for client in &self.spec.oauth_clients {
            match serde_json::to_string(client) {
                Ok(raw) => {
                    self.store.set(&self.client_key(&client.client_id), raw, None).await;
                    debug!(client_id = %client.client_id, "Seeded OAuth client");
                }
                Err(e) => warn!(client_id = %client.client_id, error = %e, "Could not seed client"),
            }
        }
    }

    fn client_key(&self, client_id: &str) -> String {
        format!("{OAUTH_CLIENT_PREFIX}{}.{}", self.spec.api_id, client_id)
    }

    async fn load_client(&self, client_id: &str) -> Result<OAuthClient, AuthError> {
        let raw = self
            .store
            .get(&self.client_key(client_id))
            .await
            .ok_or(AuthError::InvalidClient)?;
        serde_json::from_str(&raw).map_err(|_| AuthError::InvalidClient)
    }

    async fn authenticate_client(
        &self,
        creds: &ClientCredentials,
    ) -> Result<OAuthClient, AuthError> {
        let client = self.load_client(&creds.client_id).await?;
        let secret_ok: bool = client
            .secret
            .as_bytes()
            .ct_eq(creds.secret.as_bytes())
            .into();
        if !secret_ok {
            warn!(client_id = %creds.client_id, "Client secret mismatch");
            return Err(AuthError::InvalidClient);
        }
        Ok(client)
    }

    fn authorize_type(&self, params: &HashMap<String, String>) -> Result<AuthorizeType, AuthError> {
        let requested = match param(params, "response_type") {
            Some("code") => AuthorizeType::Code,
            Some("token") => AuthorizeType::Token,
            _ => return Err(AuthError::UnsupportedResponseType),
        };
        if !self
            .spec
            .oauth_meta
            .allowed_authorize_types
            .contains(&requested)
        {
            return Err(AuthError::UnsupportedResponseType);
        }
        Ok(requested)
    }

    /// Validate the client and redirect named in authorize parameters.
    async fn validated_client(
        &self,
        params: &HashMap<String, String>,
    ) -> Result<(OAuthClient, String), AuthError> {
        let client_id = param(params, "client_id").ok_or(AuthError::InvalidClient)?;
        let client = self.load_client(client_id).await?;
        let redirect_uri = param(params, "redirect_uri").ok_or(AuthError::InvalidClient)?;
        if redirect_uri != client.redirect_uri {
            warn!(client_id = %client.client_id, "Authorize redirect_uri does not match registration");
            return Err(AuthError::InvalidClient);
        }
        Ok((client, redirect_uri.to_string()))
    }

    /// Public authorize endpoint: on a valid request, produce the consent
    /// redirect location with the request parameters forwarded.
    pub async fn authorize_redirect(
        &self,
        params: &HashMap<String, String>,
    ) -> Result<String, AuthError> {
        self.authorize_type(params)?;
        self.validated_client(params).await?;

        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (name, value) in params {
            serializer.append_pair(name, value);
        }
        let forwarded = serializer.finish();

        let login = &self.spec.oauth_meta.auth_login_redirect;
        let separator = if login.contains('?') { '&' } else { '?' };
        Ok(format!("{login}{separator}{forwarded}"))
    }

    /// Administrative completion of an authorization: mint an auth code
    /// (`response_type=code`) or an access token (`response_type=token`)
    /// carrying the session described by `key_rules`.
    pub async fn complete_authorization(
        &self,
        params: &HashMap<String, String>,
    ) -> Result<serde_json::Value, AuthError> {
        let requested = self.authorize_type(params)?;
        let (client, redirect_uri) = self.validated_client(params).await?;

        let key_rules = param(params, "key_rules").ok_or(AuthError::MalformedKeyRules)?;
        let mut session =
            SessionState::from_json(key_rules).map_err(|_| AuthError::MalformedKeyRules)?;
        session.oauth_client_id = client.client_id.clone();

        match requested {
            AuthorizeType::Code => {
                let code = generate_token();
                let record = AuthCode {
                    code: code.clone(),
                    client_id: client.client_id.clone(),
                    redirect_uri,
                    expires_at: Utc::now().timestamp() + AUTH_CODE_LIFETIME.as_secs() as i64,
                    user_data: session,
                };
                self.store_record(
                    format!("{OAUTH_CODE_PREFIX}{code}"),
                    &record,
                    Some(AUTH_CODE_LIFETIME),
                )
                .await?;
                debug!(client_id = %client.client_id, "Issued authorization code");
                Ok(serde_json::json!({ "code": code }))
            }
            AuthorizeType::Token => {
                let response = self.mint(session, &client.client_id, false).await?;
                self.notifier.key_changed(TOKEN_CREATED, &response.access_token);
                Ok(serde_json::json!({
                    "access_token": response.access_token,
                    "token_type": response.token_type,
                    "expires_in": response.expires_in,
                }))
            }
        }
    }

    /// Authorization-code grant: consume the code, mint an access/refresh
    /// token pair.
    pub async fn exchange_code(
        &self,
        creds: &ClientCredentials,
        params: &HashMap<String, String>,
    ) -> Result<TokenResponse, AuthError> {
        let client = self.authenticate_client(creds).await?;
        if let Some(form_client) = param(params, "client_id") {
            if form_client != client.client_id {
                return Err(AuthError::InvalidClient);
            }
        }

        let code = param(params, "code").ok_or(AuthError::InvalidGrant)?;
        let redirect_uri = param(params, "redirect_uri").ok_or(AuthError::InvalidGrant)?;

        let code_key = format!("{OAUTH_CODE_PREFIX}{code}");
        let raw = self.store.get(&code_key).await.ok_or(AuthError::InvalidGrant)?;
        let auth_code: AuthCode =
            serde_json::from_str(&raw).map_err(|_| AuthError::InvalidGrant)?;

        // An expired code is indistinguishable from an absent one
        if auth_code.is_expired(Utc::now().timestamp()) {
            return Err(AuthError::InvalidGrant);
        }
        if auth_code.client_id != client.client_id {
            return Err(AuthError::InvalidGrant);
        }
        if auth_code.redirect_uri != redirect_uri {
            debug!(client_id = %client.client_id, "Token exchange redirect_uri mismatch");
            return Err(AuthError::InvalidGrant);
        }

        let response = self.mint(auth_code.user_data, &client.client_id, true).await?;
        // Single use, consumed only now that the token pair is persisted
        self.store.delete(&code_key).await;
        self.notifier.key_changed(TOKEN_CREATED, &response.access_token);
        Ok(response)
    }

    /// Refresh-token grant: rotate the presented refresh token into a new
    /// token pair. The presented token is invalidated; reusing it fails.
    pub async fn refresh(
        &self,
        creds: &ClientCredentials,
        params: &HashMap<String, String>,
    ) -> Result<TokenResponse, AuthError> {
        let client = self.authenticate_client(creds).await?;
        if let Some(form_client) = param(params, "client_id") {
            if form_client != client.client_id {
                return Err(AuthError::InvalidClient);
            }
        }

        let presented = param(params, "refresh_token").ok_or(AuthError::InvalidGrant)?;
        let refresh_key = format!("{OAUTH_REFRESH_PREFIX}{presented}");

        let raw = self.store.get(&refresh_key).await.ok_or(AuthError::InvalidGrant)?;
        let record: RefreshToken =
            serde_json::from_str(&raw).map_err(|_| AuthError::InvalidGrant)?;
        if record.client_id != client.client_id {
            return Err(AuthError::InvalidClient);
        }

        // The atomic take decides concurrent exchanges of the same token:
        // the loser observes absence and fails
        if self.store.take(&refresh_key).await.is_none() {
            return Err(AuthError::InvalidGrant);
        }

        // Revoke the access token the consumed refresh token was linked to
        self.store
            .delete(&format!("{OAUTH_TOKEN_PREFIX}{}", record.linked_access_token))
            .await;
        self.store
            .delete(&format!("{SESSION_PREFIX}{}", record.linked_access_token))
            .await;
        self.notifier
            .key_changed(TOKEN_REVOKED, &record.linked_access_token);

        let response = self.mint(record.session, &client.client_id, true).await?;
        self.notifier.key_changed(TOKEN_ROTATED, &response.access_token);
        Ok(response)
    }

    /// Mint an access token (and optionally a refresh token) carrying
    /// `session`, and make the session immediately queryable under the
    /// `apikey-` prefix.
    async fn mint(
        &self,
        session: SessionState,
        client_id: &str,
        with_refresh: bool,
    ) -> Result<TokenResponse, AuthError> {
        let access_token = generate_token();
        let access_ttl = Duration::from_secs(self.spec.oauth_meta.access_token_ttl);
        let expires_at = Utc::now().timestamp() + access_ttl.as_secs() as i64;
        let refresh_token = with_refresh.then(generate_token);

        let record = AccessToken {
            token: access_token.clone(),
            client_id: client_id.to_string(),
            refresh_token: refresh_token.clone(),
            expires_at,
        };
        self.store_record(
            format!("{OAUTH_TOKEN_PREFIX}{access_token}"),
            &record,
            Some(access_ttl),
        )
        .await?;
        self.store_record(
            format!("{SESSION_PREFIX}{access_token}"),
            &session,
            Some(access_ttl),
        )
        .await?;

        if let Some(refresh) = &refresh_token {
            let refresh_record = RefreshToken {
                token: refresh.clone(),
                client_id: client_id.to_string(),
                linked_access_token: access_token.clone(),
                session,
            };
            self.store_record(
                format!("{OAUTH_REFRESH_PREFIX}{refresh}"),
                &refresh_record,
                Some(Duration::from_secs(self.spec.oauth_meta.refresh_token_ttl)),
            )
            .await?;
        }

        Ok(TokenResponse {
            access_token,
            token_type: "bearer".to_string(),
            expires_in: access_ttl.as_secs(),
            refresh_token,
        })
    }

    async fn store_record<T: serde::Serialize>(
        &self,
        key: String,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), AuthError> {
        let raw = serde_json::to_string(value).map_err(|e| {
            warn!(key = %key, error = %e, "Could not encode record for storage");
            AuthError::InvalidGrant
        })?;
        self.store.set(&key, raw, ttl).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccessType, Notifications, OauthMeta};
    use crate::storage::InMemoryKeyStore;

    const CLIENT_ID: &str = "1234";
    const CLIENT_SECRET: &str = "aabbccdd";
    const REDIRECT_URI: &str = "http://client.oauth.com";

    fn oauth_spec() -> ApiSpec {
        ApiSpec {
            api_id: "999999".to_string(),
            use_oauth2: true,
            oauth_meta: OauthMeta {
                allowed_access_types: vec![AccessType::AuthorizationCode, AccessType::RefreshToken],
                allowed_authorize_types: vec![AuthorizeType::Code, AuthorizeType::Token],
                auth_login_redirect: "http://login.example.com/consent".to_string(),
                ..OauthMeta::default()
            },
            oauth_clients: vec![OAuthClient {
                client_id: CLIENT_ID.to_string(),
                secret: CLIENT_SECRET.to_string(),
                redirect_uri: REDIRECT_URI.to_string(),
                policy_id: String::new(),
            }],
            ..ApiSpec::default()
        }
    }

    async fn manager() -> (OAuthManager, Arc<InMemoryKeyStore>) {
        let store = Arc::new(InMemoryKeyStore::new());
        let manager = OAuthManager::new(
            Arc::new(oauth_spec()),
            store.clone(),
            Arc::new(Notifier::new(Notifications::default())),
        );
        manager.seed_clients().await;
        (manager, store)
    }

    fn creds() -> ClientCredentials {
        ClientCredentials {
            client_id: CLIENT_ID.to_string(),
            secret: CLIENT_SECRET.to_string(),
        }
    }

    fn authorize_params(response_type: &str) -> HashMap<String, String> {
        HashMap::from([
            ("response_type".to_string(), response_type.to_string()),
            ("client_id".to_string(), CLIENT_ID.to_string()),
            ("redirect_uri".to_string(), REDIRECT_URI.to_string()),
            ("key_rules".to_string(), "{\"quota_max\": -1}".to_string()),
        ])
    }

    fn exchange_params(code: &str) -> HashMap<String, String> {
        HashMap::from([
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("client_id".to_string(), CLIENT_ID.to_string()),
            ("redirect_uri".to_string(), REDIRECT_URI.to_string()),
            ("code".to_string(), code.to_string()),
        ])
    }

    async fn issue_code(manager: &OAuthManager) -> String {
        let body = manager
            .complete_authorization(&authorize_params("code"))
            .await
            .unwrap();
        body["code"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn authorize_redirect_forwards_params() {
        let (manager, _) = manager().await;
        let location = manager
            .authorize_redirect(&authorize_params("code"))
            .await
            .unwrap();
        assert!(location.starts_with("http://login.example.com/consent?"));
        assert!(location.contains("response_type=code"));
        assert!(location.contains("client_id=1234"));
    }

    #[tokio::test]
    async fn authorize_rejects_unknown_client() {
        let (manager, _) = manager().await;
        let mut params = authorize_params("code");
        params.insert("client_id".to_string(), "nope".to_string());
        assert_eq!(
            manager.authorize_redirect(&params).await.unwrap_err(),
            AuthError::InvalidClient
        );
    }

    #[tokio::test]
    async fn authorize_rejects_disallowed_response_type() {
        let store = Arc::new(InMemoryKeyStore::new());
        let mut spec = oauth_spec();
        spec.oauth_meta.allowed_authorize_types = vec![AuthorizeType::Code];
        let manager = OAuthManager::new(
            Arc::new(spec),
            store,
            Arc::new(Notifier::new(Notifications::default())),
        );
        manager.seed_clients().await;

        assert_eq!(
            manager
                .authorize_redirect(&authorize_params("token"))
                .await
                .unwrap_err(),
            AuthError::UnsupportedResponseType
        );
    }

    #[tokio::test]
    async fn completed_code_exchanges_for_tokens() {
        let (manager, store) = manager().await;
        let code = issue_code(&manager).await;

        let response = manager
            .exchange_code(&creds(), &exchange_params(&code))
            .await
            .unwrap();
        assert_eq!(response.token_type, "bearer");
        assert!(response.refresh_token.is_some());

        // Session is immediately queryable under the apikey- prefix
        let session_raw = store
            .get(&format!("{SESSION_PREFIX}{}", response.access_token))
            .await
            .unwrap();
        let session = SessionState::from_json(&session_raw).unwrap();
        assert_eq!(session.oauth_client_id, CLIENT_ID);
        assert_eq!(session.quota_max, -1);
    }

    #[tokio::test]
    async fn auth_code_is_single_use() {
        let (manager, _) = manager().await;
        let code = issue_code(&manager).await;

        manager
            .exchange_code(&creds(), &exchange_params(&code))
            .await
            .unwrap();
        assert_eq!(
            manager
                .exchange_code(&creds(), &exchange_params(&code))
                .await
                .unwrap_err(),
            AuthError::InvalidGrant
        );
    }

    #[tokio::test]
    async fn failed_exchange_does_not_consume_the_code() {
        let (manager, _) = manager().await;
        let code = issue_code(&manager).await;

        let mut bad = exchange_params(&code);
        bad.insert(
            "redirect_uri".to_string(),
            "http://evil.example.com".to_string(),
        );
        assert_eq!(
            manager.exchange_code(&creds(), &bad).await.unwrap_err(),
            AuthError::InvalidGrant
        );

        // The code survives for a correct retry
        assert!(
            manager
                .exchange_code(&creds(), &exchange_params(&code))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn expired_code_is_treated_as_nonexistent() {
        let (manager, store) = manager().await;
        let record = AuthCode {
            code: "stale".to_string(),
            client_id: CLIENT_ID.to_string(),
            redirect_uri: REDIRECT_URI.to_string(),
            expires_at: Utc::now().timestamp() - 1,
            user_data: SessionState::default(),
        };
        store
            .set(
                "oauth-code.stale",
                serde_json::to_string(&record).unwrap(),
                None,
            )
            .await;

        assert_eq!(
            manager
                .exchange_code(&creds(), &exchange_params("stale"))
                .await
                .unwrap_err(),
            AuthError::InvalidGrant
        );
    }

    #[tokio::test]
    async fn wrong_client_secret_is_rejected() {
        let (manager, _) = manager().await;
        let code = issue_code(&manager).await;

        let bad_creds = ClientCredentials {
            client_id: CLIENT_ID.to_string(),
            secret: "wrong".to_string(),
        };
        assert_eq!(
            manager
                .exchange_code(&bad_creds, &exchange_params(&code))
                .await
                .unwrap_err(),
            AuthError::InvalidClient
        );
    }

    #[tokio::test]
    async fn refresh_rotates_the_refresh_token() {
        let (manager, store) = manager().await;
        let code = issue_code(&manager).await;
        let first = manager
            .exchange_code(&creds(), &exchange_params(&code))
            .await
            .unwrap();
        let old_refresh = first.refresh_token.clone().unwrap();

        let params = HashMap::from([
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("client_id".to_string(), CLIENT_ID.to_string()),
            ("refresh_token".to_string(), old_refresh.clone()),
        ]);
        let second = manager.refresh(&creds(), &params).await.unwrap();

        assert_ne!(second.refresh_token.as_deref(), Some(old_refresh.as_str()));
        assert_ne!(second.access_token, first.access_token);

        // The replaced access token is revoked
        assert!(
            store
                .get(&format!("{SESSION_PREFIX}{}", first.access_token))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn double_refresh_fails_on_the_second_attempt() {
        let (manager, _) = manager().await;
        let code = issue_code(&manager).await;
        let first = manager
            .exchange_code(&creds(), &exchange_params(&code))
            .await
            .unwrap();
        let old_refresh = first.refresh_token.unwrap();

        let params = HashMap::from([
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("client_id".to_string(), CLIENT_ID.to_string()),
            ("refresh_token".to_string(), old_refresh),
        ]);
        assert!(manager.refresh(&creds(), &params).await.is_ok());
        assert_eq!(
            manager.refresh(&creds(), &params).await.unwrap_err(),
            AuthError::InvalidGrant
        );
    }

    #[tokio::test]
    async fn malformed_key_rules_are_rejected() {
        let (manager, _) = manager().await;
        let mut params = authorize_params("code");
        params.insert("key_rules".to_string(), "{not json".to_string());
        assert_eq!(
            manager.complete_authorization(&params).await.unwrap_err(),
            AuthError::MalformedKeyRules
        );
    }

    #[tokio::test]
    async fn implicit_token_completion_has_no_refresh_token() {
        let (manager, store) = manager().await;
        let body = manager
            .complete_authorization(&authorize_params("token"))
            .await
            .unwrap();

        let access_token = body["access_token"].as_str().unwrap();
        assert_eq!(body["token_type"], "bearer");
        assert!(body.get("refresh_token").is_none());
        assert!(
            store
                .get(&format!("{SESSION_PREFIX}{access_token}"))
                .await
                .is_some()
        );
    }
}
