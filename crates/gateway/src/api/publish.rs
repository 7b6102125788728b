//! Release publish and delete.
//!
//! - `POST   /api/v1/packages/:owner/:repo/releases`      — multipart publish (auth)
//! - `DELETE /api/v1/packages/:owner/:repo/releases/:tag` — delete (auth)
//!
//! Publish holds the per-release lock across blob ingest and catalog
//! commit; a failed commit unlinks a freshly written blob so no partial
//! publish is ever observable.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use zg_catalog::{BlobRef, NewRelease, PackageHints};
use zg_domain::model::Release;
use zg_domain::version::parse_tag;

use crate::api::error::ApiError;
use crate::api::guard::AuthUser;
use crate::api::{check_ident, check_tag};
use crate::state::AppState;

/// Parsed multipart publish form.
#[derive(Default)]
struct PublishForm {
    tag_name: Option<String>,
    name: Option<String>,
    body: Option<String>,
    draft: bool,
    prerelease: bool,
    file: Option<Vec<u8>>,
}

fn parse_flag(value: &str) -> bool {
    matches!(value, "true" | "1" | "on")
}

async fn read_form(mut multipart: Multipart) -> Result<PublishForm, ApiError> {
    let mut form = PublishForm::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                return Err(ApiError::PayloadTooLarge("upload exceeds the size cap".into()))
            }
            Err(e) => return Err(ApiError::BadRequest(format!("malformed multipart: {e}"))),
        };

        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "file" => {
                let bytes = field.bytes().await.map_err(|e| {
                    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                        ApiError::PayloadTooLarge("upload exceeds the size cap".into())
                    } else {
                        ApiError::BadRequest(format!("reading file part: {e}"))
                    }
                })?;
                form.file = Some(bytes.to_vec());
            }
            "tag_name" | "name" | "body" | "draft" | "prerelease" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("reading field {name}: {e}")))?;
                match name.as_str() {
                    "tag_name" => form.tag_name = Some(text),
                    "name" => form.name = Some(text),
                    "body" => form.body = Some(text),
                    "draft" => form.draft = parse_flag(&text),
                    "prerelease" => form.prerelease = parse_flag(&text),
                    _ => unreachable!(),
                }
            }
            // Unknown parts are skipped, matching the forge's tolerance.
            _ => {}
        }
    }
    Ok(form)
}

pub async fn publish_release(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    auth: AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Release>), ApiError> {
    check_ident(&owner)?;
    check_ident(&repo)?;
    if !auth.may_act_for(&owner) {
        return Err(ApiError::Forbidden(format!(
            "token user may not publish under {owner}"
        )));
    }

    let multipart = multipart.map_err(|_| {
        ApiError::UnsupportedMediaType("publish expects a multipart/form-data body".into())
    })?;
    let form = read_form(multipart).await?;

    let tag = form
        .tag_name
        .ok_or_else(|| ApiError::BadRequest("tag_name is required".into()))?;
    check_tag(&tag)?;
    if parse_tag(&tag).is_none() {
        return Err(ApiError::BadRequest(format!(
            "tag_name must be a semantic version (got {tag:?})"
        )));
    }
    let bytes = form
        .file
        .ok_or_else(|| ApiError::BadRequest("a file part named \"file\" is required".into()))?;

    // Exclusive per-release lock across store-and-commit.
    let _permit = state.publish_locks.acquire(&owner, &repo, &tag).await;

    let blob_was_present = state.blobs.exists(&owner, &repo, &tag);
    let stored = {
        let blobs = state.blobs.clone();
        let (o, r, t) = (owner.clone(), repo.clone(), tag.clone());
        tokio::task::spawn_blocking(move || blobs.store(&o, &r, &t, &bytes))
            .await
            .map_err(|e| ApiError::Internal(format!("blob ingest task: {e}")))??
    };

    let attrs = NewRelease {
        name: form.name.unwrap_or_else(|| tag.clone()),
        body: form.body.unwrap_or_default(),
        draft: form.draft,
        prerelease: form.prerelease,
    };
    let blob_ref = BlobRef {
        size: stored.size,
        sha256: stored.sha256.clone(),
    };

    let created = state
        .catalog
        .create_release(&owner, &repo, &tag, &attrs, &blob_ref, &PackageHints::default());
    if let Err(e) = created {
        // Roll back a blob this request introduced; a pre-existing blob
        // belongs to the release row that won.
        if !blob_was_present {
            if let Err(unlink) = state.blobs.delete(&owner, &repo, &tag) {
                tracing::warn!(error = %unlink, "failed to unlink blob after aborted publish");
            }
        }
        return Err(e.into());
    }

    tracing::info!(
        package = %format!("{owner}/{repo}"),
        tag = %tag,
        size = stored.size,
        by = %auth.user.username,
        "release published"
    );
    let release = state.catalog.get_release(&owner, &repo, &tag)?;
    Ok((StatusCode::CREATED, Json(release)))
}

pub async fn delete_release(
    State(state): State<AppState>,
    Path((owner, repo, tag)): Path<(String, String, String)>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    check_ident(&owner)?;
    check_ident(&repo)?;
    check_tag(&tag)?;
    if !auth.may_act_for(&owner) {
        return Err(ApiError::Forbidden(format!(
            "token user may not delete releases under {owner}"
        )));
    }

    state.catalog.delete_release(&owner, &repo, &tag)?;

    // Blob removal is best-effort; an orphan blob is an operator cleanup,
    // not a failed delete.
    if let Err(e) = state.blobs.delete(&owner, &repo, &tag) {
        tracing::warn!(
            package = %format!("{owner}/{repo}"),
            tag = %tag,
            error = %e,
            "release row deleted but blob unlink failed"
        );
    }

    tracing::info!(
        package = %format!("{owner}/{repo}"),
        tag = %tag,
        by = %auth.user.username,
        "release deleted"
    );
    Ok(Json(serde_json::json!({ "deleted": true, "tag_name": tag })))
}
