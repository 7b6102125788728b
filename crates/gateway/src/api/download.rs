//! Archive download.
//!
//! - `GET /api/v1/packages/:owner/:repo/download/:tag`
//!
//! Streams the stored blob with integrity headers. Draft releases are
//! invisible here. A download only counts once the connection has drained
//! the whole body; the increment then lands in the coalescer, not directly
//! in the catalog.

use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use futures_util::stream;

use crate::api::error::ApiError;
use crate::api::{check_ident, check_tag};
use crate::state::AppState;

/// Body that yields the archive in one frame and records the download when
/// the transport comes back for the end of stream. A client that
/// disconnects mid-transfer drops the stream before that second poll, so
/// aborted downloads never count.
fn counted_body(state: &AppState, owner: String, repo: String, tag: String, bytes: Vec<u8>) -> Body {
    let downloads = state.downloads.clone();
    Body::from_stream(stream::unfold(
        Some(Bytes::from(bytes)),
        move |chunk| {
            let downloads = downloads.clone();
            let (owner, repo, tag) = (owner.clone(), repo.clone(), tag.clone());
            async move {
                match chunk {
                    Some(data) => Some((Ok::<Bytes, Infallible>(data), None)),
                    None => {
                        downloads.record(&owner, &repo, &tag);
                        None
                    }
                }
            }
        },
    ))
}

pub async fn download(
    State(state): State<AppState>,
    Path((owner, repo, tag)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    check_ident(&owner)?;
    check_ident(&repo)?;
    check_tag(&tag)?;

    let release = state.catalog.get_release(&owner, &repo, &tag)?;
    if release.draft {
        // Drafts appear in metadata but are not downloadable.
        return Err(ApiError::NotFound("Not found".into()));
    }

    let bytes = {
        let blobs = state.blobs.clone();
        let (o, r, t) = (owner.clone(), repo.clone(), tag.clone());
        tokio::task::spawn_blocking(move || blobs.retrieve(&o, &r, &t))
            .await
            .map_err(|e| ApiError::Internal(format!("blob read task: {e}")))??
    };

    // The integrity invariant: what we serve must match what the catalog
    // recorded at publish.
    if bytes.len() as i64 != release.file_size {
        return Err(ApiError::Internal(format!(
            "stored archive size {} does not match catalog record {}",
            bytes.len(),
            release.file_size
        )));
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    // The body is streamed, so the length must be stated explicitly.
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{repo}-{tag}.zpkg\""))
            .map_err(|e| ApiError::Internal(format!("content-disposition: {e}")))?,
    );
    headers.insert(
        "X-Content-SHA256",
        HeaderValue::from_str(&release.sha256)
            .map_err(|e| ApiError::Internal(format!("integrity header: {e}")))?,
    );

    tracing::debug!(
        package = %format!("{owner}/{repo}"),
        tag = %tag,
        size = bytes.len(),
        "archive served"
    );
    let body = counted_body(&state, owner, repo, tag, bytes);
    Ok((StatusCode::OK, headers, body))
}
