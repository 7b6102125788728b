//! Federated sign-in (OIDC and OAuth).
//!
//! - `GET /api/v1/auth/oidc/:provider/login`     — start an OIDC handshake
//! - `GET /api/v1/auth/oidc/:provider/callback`  — finish it
//! - `GET /api/v1/auth/oauth/:provider/login`    — start a plain-OAuth handshake
//! - `GET /api/v1/auth/oauth/:provider/callback` — finish it
//!
//! Callbacks are browser redirects: success lands on the SPA with the
//! bearer token in the URL fragment, failure with an `error` parameter.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;
use zg_auth::federated::{make_pkce, random_token, FederatedIdentity};
use zg_auth::AuthError;
use zg_catalog::{CatalogError, UserRow};

use crate::api::error::ApiError;
use crate::api::guard::AuthUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    /// Providers report user denial and their own failures here.
    #[serde(default)]
    error: Option<String>,
}

fn callback_uri(state: &AppState, kind: &str, provider: &str) -> String {
    format!(
        "{}/api/v1/auth/{kind}/{provider}/callback",
        state.config.public_base_url()
    )
}

fn spa_success(state: &AppState, token: &str) -> Response {
    Redirect::to(&format!(
        "{}/auth/callback#token={token}",
        state.config.public_base_url()
    ))
    .into_response()
}

fn spa_failure(state: &AppState, slug: &str) -> Response {
    Redirect::to(&format!(
        "{}/auth/callback?error={slug}",
        state.config.public_base_url()
    ))
    .into_response()
}

fn failure_slug(e: &AuthError) -> &'static str {
    match e {
        AuthError::InvalidState => "invalid_state",
        AuthError::InvalidIdentityProof(_) => "identity_rejected",
        AuthError::ExpiredAuthCode(_) => "expired_code",
        AuthError::Upstream(_) => "provider_unavailable",
        _ => "auth_failed",
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Login starts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn oidc_login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Redirect, ApiError> {
    let client = state
        .oidc
        .get(&provider)
        .ok_or_else(|| ApiError::NotFound(format!("unknown OIDC provider {provider:?}")))?;

    let nonce = random_token();
    let (verifier, challenge) = make_pkce();
    let handshake = state.logins.begin(&provider, nonce.clone(), verifier);

    let url = client
        .authorize_url(
            &callback_uri(&state, "oidc", &provider),
            &handshake,
            &nonce,
            &challenge,
        )
        .await?;
    Ok(Redirect::temporary(&url))
}

pub async fn oauth_login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Redirect, ApiError> {
    let client = state
        .oauth
        .get(&provider)
        .ok_or_else(|| ApiError::NotFound(format!("unknown OAuth provider {provider:?}")))?;

    let handshake = state.logins.begin(&provider, String::new(), String::new());
    let url = client.authorize_url(&callback_uri(&state, "oauth", &provider), &handshake)?;
    Ok(Redirect::temporary(&url))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Callbacks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn oidc_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    auth: Option<AuthUser>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(client) = state.oidc.get(&provider).cloned() else {
        return spa_failure(&state, "unknown_provider");
    };
    if let Some(provider_error) = &query.error {
        tracing::warn!(provider = %provider, error = %provider_error, "provider reported callback error");
        return spa_failure(&state, "access_denied");
    }
    let (Some(code), Some(handshake)) = (&query.code, &query.state) else {
        return spa_failure(&state, "invalid_state");
    };

    let pending = match state.logins.take(handshake) {
        Ok(p) if p.provider == provider => p,
        Ok(_) => return spa_failure(&state, "invalid_state"),
        Err(e) => return spa_failure(&state, failure_slug(&e)),
    };

    let identity = match client
        .exchange(
            code,
            &callback_uri(&state, "oidc", &provider),
            &pending.pkce_verifier,
            &pending.nonce,
        )
        .await
    {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(provider = %provider, error = %e, "OIDC code exchange failed");
            return spa_failure(&state, failure_slug(&e));
        }
    };

    finish_callback(&state, auth, identity)
}

pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    auth: Option<AuthUser>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(client) = state.oauth.get(&provider).cloned() else {
        return spa_failure(&state, "unknown_provider");
    };
    if let Some(provider_error) = &query.error {
        tracing::warn!(provider = %provider, error = %provider_error, "provider reported callback error");
        return spa_failure(&state, "access_denied");
    }
    let (Some(code), Some(handshake)) = (&query.code, &query.state) else {
        return spa_failure(&state, "invalid_state");
    };

    match state.logins.take(handshake) {
        Ok(p) if p.provider == provider => {}
        Ok(_) => return spa_failure(&state, "invalid_state"),
        Err(e) => return spa_failure(&state, failure_slug(&e)),
    }

    let identity = match client
        .exchange(code, &callback_uri(&state, "oauth", &provider))
        .await
    {
        Ok(identity) => identity,
        Err(e) => {
            tracing::warn!(provider = %provider, error = %e, "OAuth code exchange failed");
            return spa_failure(&state, failure_slug(&e));
        }
    };

    finish_callback(&state, auth, identity)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Account resolution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn finish_callback(
    state: &AppState,
    auth: Option<AuthUser>,
    identity: FederatedIdentity,
) -> Response {
    match resolve_account(state, auth, &identity) {
        Ok(user) => {
            let token = crate::api::account::issue_token(state, user.id, &user.username);
            tracing::info!(
                provider = %identity.provider,
                username = %user.username,
                "federated sign-in"
            );
            spa_success(state, &token)
        }
        Err(slug) => spa_failure(state, slug),
    }
}

/// Map a vouched identity onto a local account:
/// 1. already linked → that account;
/// 2. caller is signed in AND the provider vouched for the caller's own
///    email → link the identity to the caller;
/// 3. email belongs to an existing account (and step 2 didn't match) →
///    refuse; the owner must sign in and complete the link from their
///    own session;
/// 4. otherwise → create an account and link it.
fn resolve_account(
    state: &AppState,
    auth: Option<AuthUser>,
    identity: &FederatedIdentity,
) -> Result<UserRow, &'static str> {
    match state
        .catalog
        .get_user_by_identity(&identity.provider, &identity.provider_user_id)
    {
        Ok(user) => return Ok(user),
        Err(CatalogError::NotFound) => {}
        Err(e) => {
            tracing::error!(error = %e, "identity lookup failed");
            return Err("internal");
        }
    }

    // A signed-in caller may only absorb an identity whose email matches
    // their account's; anything else goes through the refuse/create path.
    if let Some(auth) = auth {
        if identity.email.as_deref() == Some(auth.user.email.as_str()) {
            return match state.catalog.link_identity(
                auth.user.id,
                &identity.provider,
                &identity.provider_user_id,
                &identity.display,
            ) {
                Ok(()) => Ok(auth.user),
                Err(e) => {
                    tracing::error!(error = %e, "identity link failed");
                    Err("link_failed")
                }
            };
        }
        tracing::warn!(
            provider = %identity.provider,
            username = %auth.user.username,
            "federated email does not match the signed-in account, not linking"
        );
    }

    if let Some(email) = &identity.email {
        match state.catalog.get_user_by_email(email) {
            Ok(_) => return Err("email_in_use"),
            Err(CatalogError::NotFound) => {}
            Err(e) => {
                tracing::error!(error = %e, "email lookup failed");
                return Err("internal");
            }
        }
    }

    let base = identity
        .preferred_username
        .clone()
        .or_else(|| {
            identity
                .email
                .as_deref()
                .and_then(|e| e.split('@').next())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| identity.provider_user_id.clone());

    let created = (|| -> zg_catalog::Result<UserRow> {
        let username = state.catalog.find_free_username(&base)?;
        let email = identity.email.clone().unwrap_or_else(|| {
            format!(
                "{username}@users.noreply.{}",
                state.config.registry.domain
            )
        });
        let user_id = state.catalog.create_user(&username, &email, None)?;
        state.catalog.link_identity(
            user_id,
            &identity.provider,
            &identity.provider_user_id,
            &identity.display,
        )?;
        state.catalog.get_user_by_id(user_id)
    })();

    created.map_err(|e| {
        tracing::error!(error = %e, "federated account creation failed");
        "internal"
    })
}
