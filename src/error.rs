// src/error.rs
//! Error taxonomy for the VPN client portal.
//!
//! Every operation-level failure in the portal is expressed as a
//! [`PortalError`]. The orchestrator catches failures from the certificate
//! authority and the profile store and converts them into one of these
//! variants; nothing below this type escapes to an HTTP caller as an
//! unhandled fault. Each variant carries a stable machine-readable kind
//! string and maps to a fixed HTTP status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Portal-wide error type.
///
/// # Variants
/// - `Validation`: the client name failed the identifier check; never reaches
///   the CA or the store
/// - `AlreadyExists` / `NotFound`: lifecycle conflicts (create over an
///   existing client, delete/download of an absent one)
/// - `Authority`: the external CA exited nonzero or timed out; carries the
///   exit status and captured diagnostic output
/// - `PathEscape`: a resolved profile path left the store root
/// - `Store`: any other filesystem failure in the profile store
/// - `Unauthorized`: the caller is not authenticated
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("invalid client name: use only letters, numbers, dashes, and underscores")]
    Validation,

    #[error("client {0} already exists")]
    AlreadyExists(String),

    #[error("client {0} does not exist")]
    NotFound(String),

    #[error("certificate authority failure: {output}")]
    Authority {
        /// Exit status of the CA process, `None` on timeout or spawn failure.
        status: Option<i32>,
        /// Captured diagnostic output (stderr, or a timeout description).
        output: String,
    },

    #[error("profile path escapes the client store")]
    PathEscape,

    #[error("client store failure: {0}")]
    Store(String),

    #[error("authentication required")]
    Unauthorized,
}

impl PortalError {
    /// Stable kind string reported to API callers alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            PortalError::Validation => "validation",
            PortalError::AlreadyExists(_) => "conflict",
            PortalError::NotFound(_) => "not_found",
            PortalError::Authority { .. } => "authority",
            PortalError::PathEscape => "path_escape",
            PortalError::Store(_) => "store",
            PortalError::Unauthorized => "unauthorized",
        }
    }

    /// HTTP status code this error maps to at the API boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            PortalError::Validation => StatusCode::BAD_REQUEST,
            PortalError::AlreadyExists(_) => StatusCode::CONFLICT,
            PortalError::NotFound(_) => StatusCode::NOT_FOUND,
            PortalError::Authority { .. } => StatusCode::BAD_GATEWAY,
            PortalError::PathEscape => StatusCode::FORBIDDEN,
            PortalError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PortalError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<std::io::Error> for PortalError {
    fn from(err: std::io::Error) -> Self {
        PortalError::Store(err.to_string())
    }
}

/// JSON body returned for every failed API call.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

impl IntoResponse for PortalError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
            kind: self.kind(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_are_stable() {
        assert_eq!(PortalError::Validation.kind(), "validation");
        assert_eq!(PortalError::AlreadyExists("a".into()).kind(), "conflict");
        assert_eq!(PortalError::NotFound("a".into()).kind(), "not_found");
        assert_eq!(
            PortalError::Authority { status: Some(1), output: "boom".into() }.kind(),
            "authority"
        );
        assert_eq!(PortalError::PathEscape.kind(), "path_escape");
        assert_eq!(PortalError::Unauthorized.kind(), "unauthorized");
    }

    #[test]
    fn io_errors_become_store_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = PortalError::from(io);
        assert_eq!(err.kind(), "store");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
