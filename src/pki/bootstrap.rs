// src/pki/bootstrap.rs
//! One-time TLS material generation for the admin endpoint.
//!
//! Infrastructure setup, not lifecycle logic: if the configured certificate
//! and key are absent, generate a self-signed pair with openssl so the
//! deployment's TLS terminator has something to serve. Runs once at startup
//! and is a no-op when both files already exist.

use anyhow::{bail, Context};
use std::process::Stdio;
use tokio::process::Command;

use crate::config::PortalConfig;

/// Ensures the admin endpoint's certificate and key exist on disk.
///
/// # Errors
/// Fails if openssl cannot be run or exits nonzero, or if permissions on
/// the generated files cannot be set.
pub async fn ensure_tls_material(config: &PortalConfig) -> anyhow::Result<()> {
    if config.tls_cert_file.is_file() && config.tls_key_file.is_file() {
        return Ok(());
    }

    log::info!(
        "generating self-signed certificate for {}",
        config.server_ip
    );
    if let Some(parent) = config.tls_cert_file.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if let Some(parent) = config.tls_key_file.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let output = Command::new("openssl")
        .args(["req", "-x509", "-newkey", "rsa:2048"])
        .arg("-keyout")
        .arg(&config.tls_key_file)
        .arg("-out")
        .arg(&config.tls_cert_file)
        .args(["-days", "365", "-nodes", "-subj"])
        .arg(format!("/CN={}", config.server_ip))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .context("failed to launch openssl")?;

    if !output.status.success() {
        bail!(
            "openssl certificate generation failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    #[cfg(unix)]
    {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&config.tls_key_file, Permissions::from_mode(0o600)).await?;
        tokio::fs::set_permissions(&config.tls_cert_file, Permissions::from_mode(0o644)).await?;
    }

    log::info!(
        "self-signed certificate written to {}",
        config.tls_cert_file.display()
    );
    Ok(())
}
