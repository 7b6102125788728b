//! Package metadata endpoints.
//!
//! - `GET /api/v1/packages/:owner/:repo`                — package metadata
//! - `GET /api/v1/packages/:owner/:repo/releases`       — releases, newest first
//! - `GET /api/v1/packages/:owner/:repo/releases/:tag`  — one release
//! - `GET /api/v1/packages/:owner/:repo/tags`           — tag listing

use axum::extract::{Path, State};
use axum::response::Json;
use zg_domain::model::{Package, Release, TagEntry};

use crate::api::error::ApiError;
use crate::api::{check_ident, check_tag};
use crate::state::AppState;

pub async fn get_package(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<Json<Package>, ApiError> {
    check_ident(&owner)?;
    check_ident(&repo)?;
    Ok(Json(state.catalog.get_package(&owner, &repo)?))
}

pub async fn list_releases(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<Json<Vec<Release>>, ApiError> {
    check_ident(&owner)?;
    check_ident(&repo)?;
    Ok(Json(state.catalog.list_releases(&owner, &repo)?))
}

pub async fn get_release(
    State(state): State<AppState>,
    Path((owner, repo, tag)): Path<(String, String, String)>,
) -> Result<Json<Release>, ApiError> {
    check_ident(&owner)?;
    check_ident(&repo)?;
    check_tag(&tag)?;
    Ok(Json(state.catalog.get_release(&owner, &repo, &tag)?))
}

pub async fn list_tags(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<Json<Vec<TagEntry>>, ApiError> {
    check_ident(&owner)?;
    check_ident(&repo)?;
    Ok(Json(state.catalog.list_tags(&owner, &repo)?))
}
