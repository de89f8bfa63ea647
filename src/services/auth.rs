// src/services/auth.rs
//! Shared-secret authentication gate.
//!
//! The portal serves a single operator who authenticates with one password.
//! The configured value is a hex SHA-256 digest; the presented password is
//! digested and compared in constant time. Success yields a signed session
//! token, and a single middleware guard applied to the whole lifecycle route
//! tree checks it on every request.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::PortalError;

/// Session lifetime, matching the original portal's one-hour sessions.
pub const SESSION_TTL_SECS: i64 = 3600;

/// Claims carried by a session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub exp: usize,
}

/// Password verification and session-token issuance.
pub struct AuthGate {
    expected_digest: Vec<u8>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthGate {
    /// Creates a gate from the configured password digest and signing secret.
    ///
    /// # Arguments
    /// * `password_hash_hex` - Hex-encoded SHA-256 digest of the operator password
    /// * `session_secret` - HMAC secret for session tokens
    pub fn new(password_hash_hex: &str, session_secret: &str) -> anyhow::Result<Self> {
        let expected_digest = hex::decode(password_hash_hex)?;
        Ok(AuthGate {
            expected_digest,
            encoding_key: EncodingKey::from_secret(session_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(session_secret.as_bytes()),
        })
    }

    /// Constant-time check of a presented password against the configured
    /// digest.
    pub fn verify_password(&self, candidate: &str) -> bool {
        let digest = ring::digest::digest(&ring::digest::SHA256, candidate.as_bytes());
        ring::constant_time::verify_slices_are_equal(digest.as_ref(), &self.expected_digest)
            .is_ok()
    }

    /// Issues a signed session token valid for [`SESSION_TTL_SECS`].
    pub fn issue_token(&self) -> Result<String, PortalError> {
        let exp = (Utc::now() + chrono::Duration::seconds(SESSION_TTL_SECS)).timestamp() as usize;
        let claims = SessionClaims {
            sub: "operator".to_string(),
            exp,
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| PortalError::Store(format!("session token issuance failed: {err}")))
    }

    /// Whether `token` is a currently valid session token.
    pub fn validate_token(&self, token: &str) -> bool {
        jsonwebtoken::decode::<SessionClaims>(token, &self.decoding_key, &Validation::default())
            .is_ok()
    }
}

/// Route guard applied to every lifecycle endpoint.
///
/// Accepts `Authorization: Bearer <token>`; anything else is rejected with
/// `PortalError::Unauthorized` before any handler runs, so unauthenticated
/// calls cause no state change.
pub async fn require_auth(
    State(gate): State<Arc<AuthGate>>,
    request: Request,
    next: Next,
) -> Result<Response, PortalError> {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| gate.validate_token(token));

    if authorized {
        Ok(next.run(request).await)
    } else {
        Err(PortalError::Unauthorized)
    }
}
