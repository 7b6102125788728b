//! Authentication: local credentials, signed bearer tokens, and delegated
//! identity (OIDC with PKCE, plain OAuth authorization-code).

pub mod federated;
pub mod passwords;
pub mod tokens;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature mismatch")]
    BadSignature,

    #[error("token is expired")]
    Expired,

    #[error("password hash: {0}")]
    Hash(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("unknown or expired login state")]
    InvalidState,

    #[error("identity proof rejected: {0}")]
    InvalidIdentityProof(String),

    #[error("authorization code exchange failed: {0}")]
    ExpiredAuthCode(String),

    #[error("identity provider error: {0}")]
    Upstream(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
