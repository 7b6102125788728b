pub mod account;
pub mod discover;
pub mod download;
pub mod error;
pub mod federated;
pub mod guard;
pub mod meta;
pub mod packages;
pub mod publish;
pub mod search;

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use zg_domain::ident::{is_valid_ident, is_valid_tag};

use crate::state::AppState;
use error::ApiError;

/// Server-side cap on `limit` query parameters.
pub const MAX_SEARCH_LIMIT: usize = 100;
const DEFAULT_SEARCH_LIMIT: usize = 30;

/// Request body cap on everything except publish.
const NON_UPLOAD_BODY_LIMIT: usize = 8 * 1024;
/// Multipart overhead allowed on top of the archive itself.
const UPLOAD_FORM_OVERHEAD: usize = 64 * 1024;

const NON_UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Validate an owner/repo/alias path segment.
pub(crate) fn check_ident(s: &str) -> Result<(), ApiError> {
    if is_valid_ident(s) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "invalid identifier {s:?}: 1-64 ASCII letters, digits, '-' or '_'"
        )))
    }
}

/// Validate a tag path segment.
pub(crate) fn check_tag(s: &str) -> Result<(), ApiError> {
    if is_valid_tag(s) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("invalid tag {s:?}")))
    }
}

/// Clamp a `limit` query parameter: absent means the default, oversized is
/// capped, zero stays zero (an empty result, not an error).
pub(crate) fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_SEARCH_LIMIT).min(MAX_SEARCH_LIMIT)
}

/// Build the full API router.
///
/// Authentication is enforced by the [`guard::AuthUser`] extractor on the
/// handlers that need it. Routes split only by resource limits: the two
/// release paths carry uploads and get the large body cap and the long
/// deadline (their GET/DELETE methods have no body, so the looser cap is
/// moot there); everything else runs under the tight defaults.
pub fn router(state: &AppState) -> Router<AppState> {
    let max_upload = state.config.storage.max_package_size as usize + UPLOAD_FORM_OVERHEAD;
    let releases = Router::new()
        .route(
            "/api/v1/packages/:owner/:repo/releases",
            get(packages::list_releases).post(publish::publish_release),
        )
        .route(
            "/api/v1/packages/:owner/:repo/releases/:tag",
            get(packages::get_release).delete(publish::delete_release),
        )
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(TimeoutLayer::new(UPLOAD_TIMEOUT));

    let tight = Router::new()
        // Package metadata
        .route("/api/v1/packages/:owner/:repo", get(packages::get_package))
        .route("/api/v1/packages/:owner/:repo/tags", get(packages::list_tags))
        // Archive download
        .route(
            "/api/v1/packages/:owner/:repo/download/:tag",
            get(download::download),
        )
        // Search + aliases
        .route("/api/v1/search", get(search::search))
        .route("/api/v1/resolve/:short_name", get(search::resolve_alias))
        .route(
            "/api/v1/aliases/:short_name",
            put(search::put_alias).delete(search::delete_alias),
        )
        // Registry meta
        .route("/api/v1/registry/config", get(meta::registry_config))
        .route("/api/v1/health", get(meta::health))
        .route("/health", get(meta::health))
        .route("/api/v1/stats", get(meta::stats))
        // Local accounts
        .route("/api/v1/auth/register", post(account::register))
        .route("/api/v1/auth/login", post(account::login))
        .route("/api/v1/auth/logout", post(account::logout))
        .route("/api/v1/auth/me", get(account::me))
        // Federated sign-in
        .route("/api/v1/auth/oidc/:provider/login", get(federated::oidc_login))
        .route(
            "/api/v1/auth/oidc/:provider/callback",
            get(federated::oidc_callback),
        )
        .route(
            "/api/v1/auth/oauth/:provider/login",
            get(federated::oauth_login),
        )
        .route(
            "/api/v1/auth/oauth/:provider/callback",
            get(federated::oauth_callback),
        )
        // Discovery proxy
        .route("/api/discover", get(discover::discover))
        .route("/api/trending", get(discover::trending))
        .route("/api/browse", get(discover::browse))
        // Legacy surface (read-only aliases kept for older clients)
        .route("/api/packages/:owner/:repo", get(packages::get_package))
        .route(
            "/api/packages/:owner/:repo/releases",
            get(packages::list_releases),
        )
        .route("/api/search", get(search::search))
        .route("/api/stats", get(meta::stats))
        .route("/api/health", get(meta::health))
        .layer(DefaultBodyLimit::max(NON_UPLOAD_BODY_LIMIT))
        .layer(TimeoutLayer::new(NON_UPLOAD_TIMEOUT));

    tight.merge(releases)
}
