//! Signed stateless bearer tokens.
//!
//! Format: `base64url(header) . base64url(payload) . base64url(mac)` with
//! `mac = HMAC-SHA256(secret, header || "." || payload)`. The payload
//! carries `sub` (user id), `iat`, `exp` and an optional `scope`.
//! Verification order: parse, constant-time MAC check, expiry check —
//! the caller layers the revocation-list and user-active checks on top.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::{AuthError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Default token lifetime: 7 days.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 7 * 24 * 3600;

/// Scope granting cross-owner publish/delete and alias administration.
pub const SCOPE_ADMIN: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: i64,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds.
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.scope.as_deref() == Some(SCOPE_ADMIN)
    }
}

#[derive(Serialize)]
struct Header {
    alg: &'static str,
    typ: &'static str,
}

/// Issues and verifies bearer tokens with one boot-time secret.
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Mint a token for `user_id`, valid for `ttl_secs` from now.
    pub fn issue(&self, user_id: i64, scope: Option<&str>, ttl_secs: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            iat: now,
            exp: now + ttl_secs,
            scope: scope.map(str::to_owned),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> String {
        let header = serde_json::to_vec(&Header {
            alg: "HS256",
            typ: "JWT",
        })
        .expect("header serialization is infallible");
        let payload = serde_json::to_vec(claims).expect("claims serialization is infallible");

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        );
        let mac = self.mac(signing_input.as_bytes());
        format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(mac))
    }

    /// Verify a presented token and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut parts = token.split('.');
        let (header_b64, payload_b64, mac_b64) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(p), Some(m), None) => (h, p, m),
                _ => return Err(AuthError::Malformed),
            };

        let signing_input = format!("{header_b64}.{payload_b64}");
        let expected = self.mac(signing_input.as_bytes());
        let presented = URL_SAFE_NO_PAD
            .decode(mac_b64)
            .map_err(|_| AuthError::Malformed)?;
        if !bool::from(presented.ct_eq(&expected)) {
            return Err(AuthError::BadSignature);
        }

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AuthError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| AuthError::Malformed)?;

        if claims.exp <= chrono::Utc::now().timestamp() {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }

    fn mac(&self, input: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(input);
        mac.finalize().into_bytes().to_vec()
    }
}

/// SHA-256 digest of a token string, hex. The revocation list stores
/// digests, never tokens.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new(*b"0123456789abcdef0123456789abcdef")
    }

    #[test]
    fn issue_then_verify_round_trips() {
        let signer = signer();
        let token = signer.issue(42, None, 3600);
        let claims = signer.verify(&token).unwrap();
        assert_eq!(claims.sub, 42);
        assert!(claims.exp > claims.iat);
        assert!(!claims.is_admin());
    }

    #[test]
    fn admin_scope_is_carried() {
        let signer = signer();
        let token = signer.issue(1, Some(SCOPE_ADMIN), 3600);
        assert!(signer.verify(&token).unwrap().is_admin());
    }

    #[test]
    fn altered_token_fails_verification() {
        let signer = signer();
        let token = signer.issue(42, None, 3600);

        // Flip a character in the payload segment.
        let mut parts: Vec<String> = token.split('.').map(str::to_owned).collect();
        let tampered: String = parts[1]
            .chars()
            .rev()
            .collect();
        parts[1] = tampered;
        let forged = parts.join(".");

        assert!(matches!(
            signer.verify(&forged),
            Err(AuthError::BadSignature) | Err(AuthError::Malformed)
        ));
    }

    #[test]
    fn expired_token_is_rejected_despite_valid_mac() {
        let signer = signer();
        let token = signer.issue(42, None, -10);
        assert!(matches!(signer.verify(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn wrong_key_fails() {
        let token = signer().issue(42, None, 3600);
        let other = TokenSigner::new(*b"ffffffffffffffffffffffffffffffff");
        assert!(matches!(other.verify(&token), Err(AuthError::BadSignature)));
    }

    #[test]
    fn garbage_is_malformed() {
        let signer = signer();
        assert!(matches!(signer.verify("not-a-token"), Err(AuthError::Malformed)));
        assert!(matches!(signer.verify("a.b.c.d"), Err(AuthError::Malformed)));
        assert!(matches!(signer.verify(""), Err(AuthError::Malformed)));
    }

    #[test]
    fn digest_is_stable_hex() {
        let d = token_digest("abc");
        assert_eq!(d.len(), 64);
        assert_eq!(d, token_digest("abc"));
        assert_ne!(d, token_digest("abd"));
    }
}
