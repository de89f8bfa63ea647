// src/pki/authority.rs
//! External certificate authority client.
//!
//! The portal does no cryptography itself; issuance, revocation, and
//! revocation-list maintenance are delegated to an easy-rsa installation
//! driven as an external process. Every invocation runs with an explicit
//! working directory (the CA state is path-relative), captures stdout and
//! stderr, and is bounded by a hard timeout. Failures propagate verbatim
//! with exit status and diagnostic output; the client never retries.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::PortalError;
use crate::models::client::{ClientIdentifier, IssuedCredential};

/// Upper bound on any single CA invocation.
pub const CA_TIMEOUT: Duration = Duration::from_secs(30);

/// Boundary to the external certificate authority.
///
/// The production implementation shells out to easy-rsa; tests substitute a
/// scripted stub. Implementations perform one external call per operation
/// and never retry on failure.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Requests a new signed, passphrase-less certificate for `client` and
    /// reads back the credential artifacts the CA produced.
    async fn issue(&self, client: &ClientIdentifier) -> Result<IssuedCredential, PortalError>;

    /// Marks the client's certificate revoked in the CA's internal state.
    async fn revoke(&self, client: &ClientIdentifier) -> Result<(), PortalError>;

    /// Rebuilds the CA's certificate revocation list.
    ///
    /// # Returns
    /// Path of the freshly written CRL. Publishing it to the VPN server's
    /// consumption point is the orchestrator's job, not the CA's.
    async fn regenerate_crl(&self) -> Result<PathBuf, PortalError>;
}

/// Certificate authority backed by an easy-rsa working directory.
pub struct EasyRsaAuthority {
    dir: PathBuf,
}

impl EasyRsaAuthority {
    /// Creates a client for the easy-rsa installation rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        EasyRsaAuthority { dir: dir.into() }
    }

    fn pki_path(&self, rel: &str) -> PathBuf {
        self.dir.join("pki").join(rel)
    }

    /// Runs one easyrsa subcommand to completion.
    ///
    /// The working directory is passed to the child explicitly; the portal
    /// process never changes its own current directory.
    async fn run(&self, args: &[&str]) -> Result<(), PortalError> {
        let binary = self.dir.join("easyrsa");
        let mut command = Command::new(&binary);
        command
            .args(args)
            .current_dir(&self.dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(CA_TIMEOUT, command.output())
            .await
            .map_err(|_| PortalError::Authority {
                status: None,
                output: format!(
                    "easyrsa {} timed out after {}s",
                    args.join(" "),
                    CA_TIMEOUT.as_secs()
                ),
            })?
            .map_err(|err| PortalError::Authority {
                status: None,
                output: format!("failed to launch {}: {err}", binary.display()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PortalError::Authority {
                status: output.status.code(),
                output: stderr.trim().to_string(),
            });
        }
        Ok(())
    }

    /// Reads one artifact file the CA is expected to have produced.
    async fn read_artifact(&self, path: &Path) -> Result<String, PortalError> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|err| PortalError::Authority {
                status: None,
                output: format!("CA artifact {} unreadable: {err}", path.display()),
            })
    }
}

#[async_trait]
impl CertificateAuthority for EasyRsaAuthority {
    async fn issue(&self, client: &ClientIdentifier) -> Result<IssuedCredential, PortalError> {
        self.run(&["--batch", "build-client-full", client.as_str(), "nopass"])
            .await?;

        let root_cert = self.read_artifact(&self.pki_path("ca.crt")).await?;
        let client_cert = self
            .read_artifact(&self.pki_path(&format!("issued/{client}.crt")))
            .await?;
        let client_key = self
            .read_artifact(&self.pki_path(&format!("private/{client}.key")))
            .await?;
        let auth_key = self.read_artifact(&self.pki_path("ta.key")).await?;

        Ok(IssuedCredential {
            root_cert,
            client_cert,
            client_key,
            auth_key,
        })
    }

    async fn revoke(&self, client: &ClientIdentifier) -> Result<(), PortalError> {
        self.run(&["--batch", "revoke", client.as_str()]).await
    }

    async fn regenerate_crl(&self) -> Result<PathBuf, PortalError> {
        self.run(&["gen-crl"]).await?;
        let crl = self.pki_path("crl.pem");
        if !crl.is_file() {
            return Err(PortalError::Authority {
                status: None,
                output: format!("gen-crl succeeded but {} is missing", crl.display()),
            });
        }
        Ok(crl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_reports_authority_error() {
        let dir = tempfile::tempdir().unwrap();
        let ca = EasyRsaAuthority::new(dir.path());
        let client = ClientIdentifier::parse("alice").unwrap();

        let err = ca.revoke(&client).await.unwrap_err();
        match err {
            PortalError::Authority { status, output } => {
                assert_eq!(status, None);
                assert!(output.contains("failed to launch"), "{output}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_carries_status_and_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("easyrsa");
        std::fs::write(&script, "#!/bin/sh\necho 'no such client' >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let ca = EasyRsaAuthority::new(dir.path());
        let client = ClientIdentifier::parse("ghost").unwrap();

        let err = ca.revoke(&client).await.unwrap_err();
        match err {
            PortalError::Authority { status, output } => {
                assert_eq!(status, Some(3));
                assert!(output.contains("no such client"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn issue_reads_back_artifacts() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let pki = dir.path().join("pki");
        std::fs::create_dir_all(pki.join("issued")).unwrap();
        std::fs::create_dir_all(pki.join("private")).unwrap();
        std::fs::write(pki.join("ca.crt"), "ROOT\n").unwrap();
        std::fs::write(pki.join("issued/alice.crt"), "CERT\n").unwrap();
        std::fs::write(pki.join("private/alice.key"), "KEY\n").unwrap();
        std::fs::write(pki.join("ta.key"), "TA\n").unwrap();

        let script = dir.path().join("easyrsa");
        std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let ca = EasyRsaAuthority::new(dir.path());
        let client = ClientIdentifier::parse("alice").unwrap();

        let credential = ca.issue(&client).await.unwrap();
        assert_eq!(credential.root_cert, "ROOT\n");
        assert_eq!(credential.client_cert, "CERT\n");
        assert_eq!(credential.client_key, "KEY\n");
        assert_eq!(credential.auth_key, "TA\n");
    }
}
