//! Static asset serving and SPA fallback.
//!
//! Assets live under `STATIC_PATH` and are served from the `/css`, `/js`,
//! `/images` and `/assets` prefixes (plus top-level `.wasm` files) with an
//! hour of cache. Client-routed pages (`/packages`, `/search`, …) fall back
//! to the SPA's index document so deep links work. `ServeDir` refuses `..`
//! traversal; the wasm path re-checks by hand.

use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::state::AppState;

const CACHE_CONTROL_VALUE: &str = "public, max-age=3600";

/// Paths the browser router owns; all serve the index document.
const SPA_PREFIXES: &[&str] = &["/packages", "/search", "/trending", "/docs", "/auth"];

/// Asset routes under the static root.
pub fn router(state: &AppState) -> Router<AppState> {
    let root = &state.config.storage.static_path;
    Router::new()
        .nest_service("/css", ServeDir::new(root.join("css")))
        .nest_service("/js", ServeDir::new(root.join("js")))
        .nest_service("/images", ServeDir::new(root.join("images")))
        .nest_service("/assets", ServeDir::new(root.join("assets")))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_VALUE),
        ))
}

fn is_spa_path(path: &str) -> bool {
    path == "/"
        || SPA_PREFIXES.iter().any(|prefix| {
            path == *prefix || path.starts_with(&format!("{prefix}/"))
        })
}

/// Fallback for everything no API or asset route matched.
pub async fn fallback(State(state): State<AppState>, uri: Uri) -> Response {
    let path = uri.path();

    // Unknown API paths are an API 404, never HTML.
    if path.starts_with("/api/") {
        return crate::api::error::ApiError::NotFound("Not found".into()).into_response();
    }

    if is_spa_path(path) {
        let index = state.config.storage.static_path.join("index.html");
        return match tokio::fs::read(&index).await {
            Ok(bytes) => Html(bytes).into_response(),
            Err(_) => (
                StatusCode::NOT_FOUND,
                "web UI is not installed (no index.html under STATIC_PATH)",
            )
                .into_response(),
        };
    }

    // Top-level wasm modules sit next to index.html.
    if path.ends_with(".wasm") && !path.contains("..") {
        let file = state
            .config
            .storage
            .static_path
            .join(path.trim_start_matches('/'));
        if let Ok(bytes) = tokio::fs::read(&file).await {
            return (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, HeaderValue::from_static("application/wasm")),
                    (
                        header::CACHE_CONTROL,
                        HeaderValue::from_static(CACHE_CONTROL_VALUE),
                    ),
                ],
                bytes,
            )
                .into_response();
        }
    }

    StatusCode::NOT_FOUND.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spa_allowlist_matches_prefixes_only() {
        assert!(is_spa_path("/"));
        assert!(is_spa_path("/packages"));
        assert!(is_spa_path("/packages/alice/widget"));
        assert!(is_spa_path("/auth"));
        assert!(!is_spa_path("/packagesx"));
        assert!(!is_spa_path("/favicon.ico"));
        assert!(!is_spa_path("/api/v1/health"));
    }
}
