//! Local account endpoints.
//!
//! - `POST /api/v1/auth/register` — create an account, returns a token
//! - `POST /api/v1/auth/login`    — exchange credentials for a token
//! - `POST /api/v1/auth/logout`   — revoke the presented token (auth)
//! - `GET  /api/v1/auth/me`       — identify the caller (auth)

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use zg_auth::tokens::{token_digest, DEFAULT_TOKEN_TTL_SECS, SCOPE_ADMIN};

use crate::api::error::ApiError;
use crate::api::guard::AuthUser;
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Deserialize)]
pub struct RegisterRequest {
    username: String,
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

/// Issue a bearer token for a username, attaching the admin scope when the
/// configuration grants it.
pub(crate) fn issue_token(state: &AppState, user_id: i64, username: &str) -> String {
    let scope = state.is_admin_user(username).then_some(SCOPE_ADMIN);
    state.signer.issue(user_id, scope, DEFAULT_TOKEN_TTL_SECS)
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    crate::api::check_ident(&req.username)?;
    if !req.email.contains('@') || req.email.len() > 254 {
        return Err(ApiError::BadRequest("a valid email is required".into()));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    // Argon2 is deliberately slow; keep it off the async workers.
    let password = req.password.clone();
    let hash = tokio::task::spawn_blocking(move || zg_auth::passwords::hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(format!("hash task: {e}")))??;

    let user_id = state
        .catalog
        .create_user(&req.username, &req.email, Some(&hash))?;
    let token = issue_token(&state, user_id, &req.username);

    tracing::info!(username = %req.username, user_id, "account registered");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "user_id": user_id,
            "username": req.username,
            "email": req.email,
            "token": token,
        })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // One error for every failure mode; don't leak which part was wrong.
    let invalid = || ApiError::Unauthorized("invalid credentials".into());

    let user = match state.catalog.get_user_by_name(&req.username) {
        Ok(user) => user,
        Err(zg_catalog::CatalogError::NotFound) => return Err(invalid()),
        Err(e) => return Err(e.into()),
    };
    let Some(hash) = user.password_hash.clone() else {
        // Federated-only account: no password to check.
        return Err(invalid());
    };
    if !user.active {
        return Err(invalid());
    }

    let password = req.password.clone();
    let verified =
        tokio::task::spawn_blocking(move || zg_auth::passwords::verify_password(&password, &hash))
            .await
            .map_err(|e| ApiError::Internal(format!("verify task: {e}")))?;
    if verified.is_err() {
        return Err(invalid());
    }

    let token = issue_token(&state, user.id, &user.username);
    tracing::info!(username = %user.username, "login");
    Ok(Json(serde_json::json!({
        "user_id": user.id,
        "username": user.username,
        "token": token,
    })))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .catalog
        .revoke_token(&token_digest(&auth.token), auth.claims.exp)?;
    tracing::info!(username = %auth.user.username, "logout");
    Ok(Json(serde_json::json!({ "message": "logged out" })))
}

pub async fn me(auth: AuthUser) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "user_id": auth.user.id,
        "username": auth.user.username,
        "email": auth.user.email,
        "authenticated": true,
        "admin": auth.is_admin(),
    }))
}
