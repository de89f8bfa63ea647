// src/config.rs
//! Environment-driven portal configuration.
//!
//! All knobs come from environment variables (optionally via a `.env` file
//! loaded in `main`). Paths default to the standard container layout of the
//! OpenVPN deployment this portal administers.

use anyhow::{bail, Context};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Runtime configuration for the portal process.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Address the admin API listens on.
    pub bind_addr: SocketAddr,
    /// Public address VPN clients connect to; embedded in every profile.
    pub server_ip: String,
    /// Working directory of the easy-rsa CA installation.
    pub easyrsa_dir: PathBuf,
    /// Directory holding one `.ovpn` profile per active client.
    pub client_dir: PathBuf,
    /// Path the VPN server reads the revocation list from.
    pub crl_publish_path: PathBuf,
    /// Hex-encoded SHA-256 digest of the operator password.
    pub password_hash: String,
    /// Secret used to sign session tokens.
    pub session_secret: String,
    /// Self-signed certificate for the admin endpoint's TLS terminator.
    pub tls_cert_file: PathBuf,
    /// Private key matching `tls_cert_file`.
    pub tls_key_file: PathBuf,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl PortalConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    /// Fails if `SERVER_IP` or `PORTAL_PASSWORD_HASH` is missing, or if
    /// `BIND_ADDR` is not a parseable socket address.
    pub fn from_env() -> anyhow::Result<Self> {
        let server_ip =
            std::env::var("SERVER_IP").context("SERVER_IP must be set")?;
        let password_hash = std::env::var("PORTAL_PASSWORD_HASH")
            .context("PORTAL_PASSWORD_HASH must be set")?;
        if password_hash.len() != 64 || hex::decode(&password_hash).is_err() {
            bail!("PORTAL_PASSWORD_HASH must be a hex-encoded SHA-256 digest");
        }

        let bind_addr: SocketAddr = env_or("BIND_ADDR", "0.0.0.0:8443")
            .parse()
            .context("BIND_ADDR must be a socket address")?;

        let session_secret = match std::env::var("SESSION_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                // Sessions do not survive a restart without a configured secret.
                log::warn!("SESSION_SECRET not set; generating an ephemeral one");
                rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(64)
                    .map(char::from)
                    .collect()
            }
        };

        Ok(PortalConfig {
            bind_addr,
            server_ip,
            easyrsa_dir: env_or("EASYRSA_DIR", "/etc/openvpn/easy-rsa").into(),
            client_dir: env_or("CLIENT_DIR", "/app/data/clients").into(),
            crl_publish_path: env_or("CRL_FILE", "/etc/openvpn/server/crl.pem").into(),
            password_hash,
            session_secret,
            tls_cert_file: env_or("CERT_FILE", "/app/certs/cert.pem").into(),
            tls_key_file: env_or("KEY_FILE", "/app/certs/key.pem").into(),
        })
    }
}
