//! Discovery-proxy surface: cached read-through to the external discovery
//! provider.
//!
//! - `GET /api/discover?q=&limit=`
//! - `GET /api/trending?category=&limit=`
//! - `GET /api/browse?category=&limit=`
//!
//! Results are cached in the catalog for an hour. A failing upstream
//! serves the stale entry; a cold miss with a failing upstream serves an
//! empty list. The UI never sees a discovery error.

use axum::extract::{Query, State};
use axum::response::Json;
use serde::Deserialize;
use zg_discovery::DiscoveredPackage;

use crate::api::clamp_limit;
use crate::state::AppState;

/// Cache lifetime for upstream results.
const DISCOVERY_TTL_SECS: i64 = 3600;

#[derive(Deserialize)]
pub struct DiscoverQuery {
    #[serde(default)]
    q: String,
    #[serde(default)]
    category: Option<String>,
    limit: Option<usize>,
}

enum Call<'a> {
    Search { q: &'a str },
    Trending { category: Option<&'a str> },
    Browse { category: &'a str },
}

fn items_response(items: Vec<DiscoveredPackage>) -> Json<serde_json::Value> {
    let total_count = items.len();
    Json(serde_json::json!({
        "items": items,
        "total_count": total_count,
    }))
}

fn parse_cached(payload: &str) -> Vec<DiscoveredPackage> {
    serde_json::from_str(payload).unwrap_or_default()
}

async fn serve(state: &AppState, key: String, call: Call<'_>, limit: usize) -> Json<serde_json::Value> {
    let cached = state
        .catalog
        .get_discovery_cache(&key)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "discovery cache read failed");
            None
        });

    if let Some((payload, age)) = &cached {
        if *age < DISCOVERY_TTL_SECS {
            return items_response(parse_cached(payload));
        }
    }

    let Some(provider) = &state.discovery else {
        return items_response(Vec::new());
    };

    let fetched = match call {
        Call::Search { q } => provider.search(q, limit).await,
        Call::Trending { category } => provider.trending(category, limit).await,
        Call::Browse { category } => provider.browse(category, limit).await,
    };

    match fetched {
        Ok(items) => {
            if let Ok(payload) = serde_json::to_string(&items) {
                if let Err(e) = state.catalog.put_discovery_cache(&key, &payload) {
                    tracing::warn!(error = %e, "discovery cache write failed");
                }
            }
            items_response(items)
        }
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "discovery upstream failed");
            // Stale beats empty; empty beats an error.
            match cached {
                Some((payload, _)) => items_response(parse_cached(&payload)),
                None => items_response(Vec::new()),
            }
        }
    }
}

pub async fn discover(
    State(state): State<AppState>,
    Query(query): Query<DiscoverQuery>,
) -> Json<serde_json::Value> {
    let limit = clamp_limit(query.limit);
    let key = format!("search:{}:{limit}", query.q);
    serve(&state, key, Call::Search { q: &query.q }, limit).await
}

pub async fn trending(
    State(state): State<AppState>,
    Query(query): Query<DiscoverQuery>,
) -> Json<serde_json::Value> {
    let limit = clamp_limit(query.limit);
    let category = query.category.as_deref();
    let key = format!("trending:{}:{limit}", category.unwrap_or(""));
    serve(&state, key, Call::Trending { category }, limit).await
}

pub async fn browse(
    State(state): State<AppState>,
    Query(query): Query<DiscoverQuery>,
) -> Json<serde_json::Value> {
    let limit = clamp_limit(query.limit);
    let category = query.category.as_deref().unwrap_or("all");
    let key = format!("browse:{category}:{limit}");
    serve(&state, key, Call::Browse { category }, limit).await
}
