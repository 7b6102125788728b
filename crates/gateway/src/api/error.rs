//! API error taxonomy and its HTTP mapping.
//!
//! Every failure surfaces as `{"message": ..., "documentation_url": ...}`
//! with the status the taxonomy assigns. Store-level errors convert via
//! `From`, so handlers mostly end in `?`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use zg_auth::AuthError;
use zg_blobs::BlobError;
use zg_catalog::CatalogError;

/// Pointed at by every error body.
const DOCS_URL: &str = "/docs/api";

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    PayloadTooLarge(String),
    UnsupportedMediaType(String),
    Internal(String),
    BadGateway(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(m)
            | ApiError::Unauthorized(m)
            | ApiError::Forbidden(m)
            | ApiError::NotFound(m)
            | ApiError::Conflict(m)
            | ApiError::PayloadTooLarge(m)
            | ApiError::UnsupportedMediaType(m)
            | ApiError::Internal(m)
            | ApiError::BadGateway(m) => m,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, message = %self.message(), "request failed");
        }
        (
            status,
            Json(serde_json::json!({
                "message": self.message(),
                "documentation_url": DOCS_URL,
            })),
        )
            .into_response()
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::NotFound => ApiError::NotFound("Not found".into()),
            CatalogError::UsernameTaken
            | CatalogError::EmailTaken
            | CatalogError::AlreadyLinked => ApiError::Conflict(e.to_string()),
            CatalogError::VersionExists => ApiError::Conflict("Release already exists".into()),
            CatalogError::PackageLocked => ApiError::Forbidden(e.to_string()),
            CatalogError::Sqlite(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<BlobError> for ApiError {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::TooLarge { .. } => ApiError::PayloadTooLarge(e.to_string()),
            BlobError::AlreadyExists => ApiError::Conflict("Release already exists".into()),
            BlobError::NotFound => ApiError::NotFound("Archive not found".into()),
            BlobError::Io(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Malformed
            | AuthError::BadSignature
            | AuthError::Expired
            | AuthError::InvalidCredentials => ApiError::Unauthorized(e.to_string()),
            AuthError::InvalidState
            | AuthError::InvalidIdentityProof(_)
            | AuthError::ExpiredAuthCode(_) => ApiError::BadRequest(e.to_string()),
            AuthError::Hash(_) => ApiError::Internal(e.to_string()),
            AuthError::Upstream(_) => ApiError::BadGateway(e.to_string()),
        }
    }
}
