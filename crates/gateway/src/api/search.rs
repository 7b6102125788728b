//! Search, alias resolution and alias administration.
//!
//! - `GET    /api/v1/search?q=&limit=`      — ranked full-text search
//! - `GET    /api/v1/resolve/:short_name`   — resolve an alias
//! - `PUT    /api/v1/aliases/:short_name`   — create/repoint (auth)
//! - `DELETE /api/v1/aliases/:short_name`   — remove (auth)

use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::Deserialize;
use zg_domain::model::Alias;

use crate::api::error::ApiError;
use crate::api::guard::AuthUser;
use crate::api::{check_ident, clamp_limit};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    q: String,
    limit: Option<usize>,
}

pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = clamp_limit(query.limit);
    let items = state.catalog.search_packages(&query.q, limit)?;
    let total_count = items.len();
    Ok(Json(serde_json::json!({
        "items": items,
        "total_count": total_count,
    })))
}

pub async fn resolve_alias(
    State(state): State<AppState>,
    Path(short_name): Path<String>,
) -> Result<Json<Alias>, ApiError> {
    check_ident(&short_name)?;
    Ok(Json(state.catalog.resolve_alias(&short_name)?))
}

#[derive(Deserialize)]
pub struct AliasTarget {
    owner: String,
    repo: String,
}

pub async fn put_alias(
    State(state): State<AppState>,
    Path(short_name): Path<String>,
    auth: AuthUser,
    Json(target): Json<AliasTarget>,
) -> Result<Json<serde_json::Value>, ApiError> {
    check_ident(&short_name)?;
    check_ident(&target.owner)?;
    check_ident(&target.repo)?;

    // Aliases may be claimed by the target's owner, or by an admin.
    if !auth.may_act_for(&target.owner) {
        return Err(ApiError::Forbidden(
            "only the package owner or an admin may manage this alias".into(),
        ));
    }

    state.catalog.upsert_alias(
        &short_name,
        &target.owner,
        &target.repo,
        &auth.user.username,
    )?;
    tracing::info!(
        short_name = %short_name,
        target = %format!("{}/{}", target.owner, target.repo),
        by = %auth.user.username,
        "alias upserted"
    );
    Ok(Json(serde_json::json!({
        "short_name": short_name,
        "full_name": format!("{}/{}", target.owner, target.repo),
    })))
}

pub async fn delete_alias(
    State(state): State<AppState>,
    Path(short_name): Path<String>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    check_ident(&short_name)?;

    let alias = state.catalog.resolve_alias(&short_name);
    let owner = match &alias {
        Ok(alias) => alias.owner.clone(),
        // A dangling alias can still be deleted, but only by an admin.
        Err(_) => String::new(),
    };
    if !auth.may_act_for(&owner) {
        return Err(ApiError::Forbidden(
            "only the package owner or an admin may manage this alias".into(),
        ));
    }

    state.catalog.delete_alias(&short_name)?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
