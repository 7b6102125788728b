//! Liveness, aggregate stats and the registry capability document.
//!
//! - `GET /api/v1/health` (also `/health`, `/api/health`)
//! - `GET /api/v1/stats`
//! - `GET /api/v1/registry/config`

use axum::extract::State;
use axum::response::Json;
use zg_domain::model::{RegistryFeatures, Stats};

use crate::api::error::ApiError;
use crate::state::AppState;

fn features(state: &AppState) -> RegistryFeatures {
    RegistryFeatures {
        publish: true,
        search: true,
        aliases: true,
        discovery: state.discovery.is_some(),
        federated_auth: state.config.has_federated_auth(),
    }
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().timestamp(),
        "version": env!("CARGO_PKG_VERSION"),
        "features": features(&state),
    }))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<Stats>, ApiError> {
    Ok(Json(state.catalog.get_stats()?))
}

pub async fn registry_config(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": state.config.registry.name,
        "domain": state.config.registry.domain,
        "api_version": "v1",
        "max_package_size": state.config.storage.max_package_size,
        "features": features(&state),
    }))
}
