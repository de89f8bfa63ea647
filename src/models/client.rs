// src/models/client.rs
//! VPN client identity data models.
//!
//! Defines the validated client identifier and the credential material the
//! certificate authority hands back on issuance. The identifier doubles as
//! the CA subject name and as the profile file name, which is why it is a
//! parse-don't-validate newtype: no raw string reaches either consumer.

use serde::Serialize;
use std::fmt;

use crate::error::PortalError;

/// A validated VPN client name.
///
/// Invariant: non-empty and matching `[A-Za-z0-9_-]+`. This is the sole
/// defense against path traversal in the profile store and argument
/// injection into the CA command line, so construction is only possible
/// through [`ClientIdentifier::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentifier(String);

impl ClientIdentifier {
    /// Parses a raw string into a validated identifier.
    ///
    /// # Arguments
    /// * `raw` - Operator-supplied client name
    ///
    /// # Returns
    /// The validated identifier, or `PortalError::Validation` if `raw` is
    /// empty or contains anything outside letters, digits, `-`, `_`.
    pub fn parse(raw: &str) -> Result<Self, PortalError> {
        if raw.is_empty() {
            return Err(PortalError::Validation);
        }
        let ok = raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !ok {
            return Err(PortalError::Validation);
        }
        Ok(ClientIdentifier(raw.to_string()))
    }

    /// The identifier as a plain string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of this client's connection profile in the store.
    pub fn profile_file_name(&self) -> String {
        format!("{}.ovpn", self.0)
    }
}

impl fmt::Display for ClientIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the client listing: an issued identity and the byte size of
/// its stored profile.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ClientEntry {
    pub name: String,
    pub size: u64,
}

/// Credential material produced by the CA for one client.
///
/// Consumed exactly once by the profile assembler; the portal never persists
/// these pieces individually, only the assembled profile document.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    /// CA root certificate (PEM).
    pub root_cert: String,
    /// Signed client certificate (PEM).
    pub client_cert: String,
    /// Client private key (PEM, passphrase-less).
    pub client_key: String,
    /// Shared TLS auth key.
    pub auth_key: String,
}
