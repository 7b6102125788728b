//! Delegated identity: OIDC (authorization-code + PKCE) and plain OAuth
//! authorization-code providers.
//!
//! Both flows produce a [`FederatedIdentity`] the gateway feeds through the
//! account-linking steps. Login state (state nonce, OIDC nonce, PKCE
//! verifier) lives in an in-process store with a 10-minute TTL.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use zg_domain::config::{OauthProviderConfig, OidcProviderConfig};

use crate::{AuthError, Result};

/// How long a login handshake may take before its state is dropped.
const STATE_TTL: Duration = Duration::from_secs(600);

/// JWKS cache lifetime.
const JWKS_TTL: Duration = Duration::from_secs(3600);

/// What a provider vouched for, normalized across OIDC and OAuth.
#[derive(Debug, Clone)]
pub struct FederatedIdentity {
    pub provider: String,
    pub provider_user_id: String,
    pub email: Option<String>,
    pub preferred_username: Option<String>,
    pub display: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Login state store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One in-flight login handshake, keyed by the `state` parameter.
#[derive(Debug, Clone)]
pub struct PendingLogin {
    pub provider: String,
    pub nonce: String,
    pub pkce_verifier: String,
    created_at: Instant,
}

/// In-process store of in-flight handshakes. Entries are single-use and
/// expire after [`STATE_TTL`].
#[derive(Default)]
pub struct LoginStateStore {
    pending: Mutex<HashMap<String, PendingLogin>>,
}

impl LoginStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new handshake, returning its `state` key.
    pub fn begin(&self, provider: &str, nonce: String, pkce_verifier: String) -> String {
        let state = random_token();
        let mut pending = self.pending.lock();
        pending.retain(|_, p| p.created_at.elapsed() < STATE_TTL);
        pending.insert(
            state.clone(),
            PendingLogin {
                provider: provider.to_owned(),
                nonce,
                pkce_verifier,
                created_at: Instant::now(),
            },
        );
        state
    }

    /// Consume a handshake by state. Unknown, reused or expired states all
    /// map to [`AuthError::InvalidState`].
    pub fn take(&self, state: &str) -> Result<PendingLogin> {
        let mut pending = self.pending.lock();
        match pending.remove(state) {
            Some(p) if p.created_at.elapsed() < STATE_TTL => Ok(p),
            _ => Err(AuthError::InvalidState),
        }
    }
}

/// 256 bits of randomness, base64url.
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    bytes[..16].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
    bytes[16..].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
    URL_SAFE_NO_PAD.encode(bytes)
}

/// PKCE pair: `(verifier, S256 challenge)`.
pub fn make_pkce() -> (String, String) {
    let verifier = random_token();
    let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
    (verifier, challenge)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// OIDC
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
struct DiscoveryDoc {
    issuer: String,
    authorization_endpoint: String,
    token_endpoint: String,
    jwks_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    n: String,
    #[serde(default)]
    e: String,
}

#[derive(Debug, Clone, Deserialize)]
struct JwksDoc {
    keys: Vec<Jwk>,
}

struct CachedJwks {
    keys: Vec<Jwk>,
    fetched_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    nonce: Option<String>,
}

/// One configured OIDC provider. Issuer metadata is fetched once; the JWKS
/// document is cached for an hour and refreshed under a singleflight lock.
pub struct OidcClient {
    pub config: OidcProviderConfig,
    http: reqwest::Client,
    discovery: RwLock<Option<DiscoveryDoc>>,
    jwks: RwLock<Option<CachedJwks>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl OidcClient {
    pub fn new(config: OidcProviderConfig, http: reqwest::Client) -> Self {
        Self {
            config,
            http,
            discovery: RwLock::new(None),
            jwks: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn discovery(&self) -> Result<DiscoveryDoc> {
        if let Some(doc) = self.discovery.read().clone() {
            return Ok(doc);
        }
        let _guard = self.refresh_lock.lock().await;
        if let Some(doc) = self.discovery.read().clone() {
            return Ok(doc);
        }

        let url = format!("{}/.well-known/openid-configuration", self.config.issuer);
        let doc: DiscoveryDoc = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AuthError::Upstream(format!("issuer discovery: {e}")))?
            .error_for_status()
            .map_err(|e| AuthError::Upstream(format!("issuer discovery: {e}")))?
            .json()
            .await
            .map_err(|e| AuthError::Upstream(format!("issuer discovery: {e}")))?;
        tracing::debug!(provider = %self.config.id, issuer = %doc.issuer, "OIDC issuer metadata loaded");
        *self.discovery.write() = Some(doc.clone());
        Ok(doc)
    }

    async fn jwks(&self) -> Result<Vec<Jwk>> {
        if let Some(cached) = self.jwks.read().as_ref() {
            if cached.fetched_at.elapsed() < JWKS_TTL {
                return Ok(cached.keys.clone());
            }
        }

        let _guard = self.refresh_lock.lock().await;
        if let Some(cached) = self.jwks.read().as_ref() {
            if cached.fetched_at.elapsed() < JWKS_TTL {
                return Ok(cached.keys.clone());
            }
        }

        let jwks_uri = self.discovery().await?.jwks_uri;
        let doc: JwksDoc = self
            .http
            .get(&jwks_uri)
            .send()
            .await
            .map_err(|e| AuthError::Upstream(format!("JWKS fetch: {e}")))?
            .error_for_status()
            .map_err(|e| AuthError::Upstream(format!("JWKS fetch: {e}")))?
            .json()
            .await
            .map_err(|e| AuthError::Upstream(format!("JWKS fetch: {e}")))?;
        tracing::debug!(provider = %self.config.id, keys = doc.keys.len(), "JWKS refreshed");
        *self.jwks.write() = Some(CachedJwks {
            keys: doc.keys.clone(),
            fetched_at: Instant::now(),
        });
        Ok(doc.keys)
    }

    /// Build the provider redirect for a new login handshake.
    pub async fn authorize_url(
        &self,
        redirect_uri: &str,
        state: &str,
        nonce: &str,
        code_challenge: &str,
    ) -> Result<String> {
        let doc = self.discovery().await?;
        let url = reqwest::Url::parse_with_params(
            &doc.authorization_endpoint,
            &[
                ("response_type", "code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("scope", "openid profile email"),
                ("state", state),
                ("nonce", nonce),
                ("code_challenge", code_challenge),
                ("code_challenge_method", "S256"),
            ],
        )
        .map_err(|e| AuthError::Upstream(format!("authorize endpoint: {e}")))?;
        Ok(url.to_string())
    }

    /// Exchange the authorization code and validate the ID token.
    pub async fn exchange(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
        expected_nonce: &str,
    ) -> Result<FederatedIdentity> {
        let doc = self.discovery().await?;
        let response = self
            .http
            .post(&doc.token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code_verifier", code_verifier),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Upstream(format!("token endpoint: {e}")))?;

        if response.status().is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::ExpiredAuthCode(body));
        }
        let tokens: TokenResponse = response
            .error_for_status()
            .map_err(|e| AuthError::Upstream(format!("token endpoint: {e}")))?
            .json()
            .await
            .map_err(|e| AuthError::Upstream(format!("token endpoint: {e}")))?;

        let id_token = tokens
            .id_token
            .ok_or_else(|| AuthError::InvalidIdentityProof("no id_token in response".into()))?;
        let claims = self.validate_id_token(&id_token, &doc.issuer).await?;

        if claims.nonce.as_deref() != Some(expected_nonce) {
            return Err(AuthError::InvalidIdentityProof("nonce mismatch".into()));
        }

        let display = claims
            .name
            .clone()
            .or_else(|| claims.preferred_username.clone())
            .unwrap_or_else(|| claims.sub.clone());
        Ok(FederatedIdentity {
            provider: self.config.id.clone(),
            provider_user_id: claims.sub,
            email: claims.email,
            preferred_username: claims.preferred_username,
            display,
        })
    }

    /// Check the ID token's signature against the provider JWKS and its
    /// `iss`/`aud`/`exp` claims.
    async fn validate_id_token(&self, id_token: &str, issuer: &str) -> Result<IdTokenClaims> {
        let header = jsonwebtoken::decode_header(id_token)
            .map_err(|e| AuthError::InvalidIdentityProof(format!("header: {e}")))?;

        let keys = self.jwks().await?;
        let jwk = match &header.kid {
            Some(kid) => keys.iter().find(|k| k.kid.as_deref() == Some(kid)),
            None => keys.first(),
        }
        .ok_or_else(|| AuthError::InvalidIdentityProof("no matching JWKS key".into()))?;

        let key = jsonwebtoken::DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
            .map_err(|e| AuthError::InvalidIdentityProof(format!("JWKS key: {e}")))?;

        let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::RS256);
        validation.set_audience(&[self.config.client_id.as_str()]);
        validation.set_issuer(&[issuer]);

        jsonwebtoken::decode::<IdTokenClaims>(id_token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::InvalidIdentityProof(e.to_string()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Plain OAuth
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Arbitrary-shaped userinfo; providers disagree on field names.
#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    login: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// One configured plain-OAuth provider (authorization-code, no ID token;
/// identity comes from the userinfo endpoint).
pub struct OauthClient {
    pub config: OauthProviderConfig,
    http: reqwest::Client,
}

impl OauthClient {
    pub fn new(config: OauthProviderConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> Result<String> {
        let url = reqwest::Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("response_type", "code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("scope", "read:user user:email"),
                ("state", state),
            ],
        )
        .map_err(|e| AuthError::Upstream(format!("authorize endpoint: {e}")))?;
        Ok(url.to_string())
    }

    pub async fn exchange(&self, code: &str, redirect_uri: &str) -> Result<FederatedIdentity> {
        let response = self
            .http
            .post(&self.config.token_url)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Upstream(format!("token endpoint: {e}")))?;

        if response.status().is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::ExpiredAuthCode(body));
        }
        let tokens: TokenResponse = response
            .error_for_status()
            .map_err(|e| AuthError::Upstream(format!("token endpoint: {e}")))?
            .json()
            .await
            .map_err(|e| AuthError::Upstream(format!("token endpoint: {e}")))?;
        let access_token = tokens
            .access_token
            .ok_or_else(|| AuthError::InvalidIdentityProof("no access_token in response".into()))?;

        let info: UserInfo = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(&access_token)
            .header("User-Agent", "ziggurat-registry")
            .send()
            .await
            .map_err(|e| AuthError::Upstream(format!("userinfo: {e}")))?
            .error_for_status()
            .map_err(|e| AuthError::Upstream(format!("userinfo: {e}")))?
            .json()
            .await
            .map_err(|e| AuthError::Upstream(format!("userinfo: {e}")))?;

        let provider_user_id = match (&info.id, &info.sub) {
            (Some(serde_json::Value::Number(n)), _) => n.to_string(),
            (Some(serde_json::Value::String(s)), _) => s.clone(),
            (_, Some(sub)) => sub.clone(),
            _ => {
                return Err(AuthError::InvalidIdentityProof(
                    "userinfo has no stable user id".into(),
                ))
            }
        };
        let display = info
            .name
            .clone()
            .or_else(|| info.login.clone())
            .unwrap_or_else(|| provider_user_id.clone());
        Ok(FederatedIdentity {
            provider: self.config.id.clone(),
            provider_user_id,
            email: info.email,
            preferred_username: info.login,
            display,
        })
    }
}
