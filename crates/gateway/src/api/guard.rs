//! Bearer-token authentication.
//!
//! [`AuthUser`] is an extractor: handlers that require authentication take
//! it as a parameter, handlers where it is optional take `Option<AuthUser>`
//! (federated callbacks, which link identities to a signed-in account).
//!
//! Verification order: parse + constant-time MAC check, expiry, revocation
//! list, user-active check.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use zg_auth::tokens::Claims;
use zg_catalog::UserRow;

use crate::api::error::ApiError;
use crate::state::AppState;

/// The authenticated caller.
#[derive(Clone)]
pub struct AuthUser {
    pub user: UserRow,
    pub claims: Claims,
    /// The raw presented token (needed by logout for revocation).
    pub token: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.claims.is_admin()
    }

    /// Ownership check: the caller is `owner` itself, or holds the admin
    /// scope.
    pub fn may_act_for(&self, owner: &str) -> bool {
        self.is_admin() || self.user.username == owner
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Resolve a presented bearer token to a user, or say why not.
fn resolve(state: &AppState, token: &str) -> Result<AuthUser, ApiError> {
    let claims = state.signer.verify(token)?;

    let digest = zg_auth::tokens::token_digest(token);
    if state
        .catalog
        .is_token_revoked(&digest)
        .map_err(ApiError::from)?
    {
        return Err(ApiError::Unauthorized("token has been revoked".into()));
    }

    let user = match state.catalog.get_user_by_id(claims.sub) {
        Ok(user) => user,
        Err(zg_catalog::CatalogError::NotFound) => {
            return Err(ApiError::Unauthorized("token user no longer exists".into()))
        }
        Err(e) => return Err(e.into()),
    };
    if !user.active {
        return Err(ApiError::Unauthorized("account is deactivated".into()));
    }

    Ok(AuthUser {
        user,
        claims,
        token: token.to_owned(),
    })
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token =
            bearer_token(parts).ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;
        resolve(state, token)
    }
}
