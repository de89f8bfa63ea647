// src/storage/profile_store.rs
//! On-disk store of issued connection profiles.
//!
//! Owns one directory with one `<client>.ovpn` file per active identity.
//! Writes are atomic with respect to readers (temp file then rename), and
//! path resolution re-verifies containment inside the canonical store root
//! independently of identifier validation.

use std::io::ErrorKind;
use std::path::PathBuf;

use crate::error::PortalError;
use crate::models::client::{ClientEntry, ClientIdentifier};

const PROFILE_EXTENSION: &str = "ovpn";

/// Filesystem store mapping client identifiers to profile documents.
pub struct ProfileStore {
    root: PathBuf,
}

impl ProfileStore {
    /// Creates a store rooted at `root`. The directory itself is created
    /// lazily on first use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ProfileStore { root: root.into() }
    }

    fn profile_path(&self, client: &ClientIdentifier) -> PathBuf {
        self.root.join(client.profile_file_name())
    }

    async fn ensure_root(&self) -> Result<(), PortalError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Enumerates stored profiles as `(identifier, byte size)` entries,
    /// sorted by name.
    pub async fn list(&self) -> Result<Vec<ClientEntry>, PortalError> {
        self.ensure_root().await?;

        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(PROFILE_EXTENSION) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                entries.push(ClientEntry {
                    name: name.to_string(),
                    size: metadata.len(),
                });
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Whether a profile is stored for `client`.
    pub async fn exists(&self, client: &ClientIdentifier) -> bool {
        tokio::fs::try_exists(self.profile_path(client))
            .await
            .unwrap_or(false)
    }

    /// Writes the profile document for `client`.
    ///
    /// The content lands in a temporary file in the store directory and is
    /// renamed into place, so no reader observes a half-written profile.
    /// Mode is 0644: the file embeds the client's private key, but it exists
    /// to be distributed to that client; world readability is the accepted
    /// tradeoff, not an oversight.
    pub async fn write(
        &self,
        client: &ClientIdentifier,
        content: &str,
    ) -> Result<PathBuf, PortalError> {
        self.ensure_root().await?;
        let path = self.profile_path(client);
        let staging = self.root.join(format!(".{}.tmp", client.profile_file_name()));

        tokio::fs::write(&staging, content).await?;
        #[cfg(unix)]
        {
            use std::fs::Permissions;
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&staging, Permissions::from_mode(0o644)).await?;
        }
        tokio::fs::rename(&staging, &path).await?;
        Ok(path)
    }

    /// Resolves the on-disk path of the profile for `client`.
    ///
    /// Canonicalizes both the candidate path and the store root and requires
    /// the former to stay inside the latter. This holds even if a symlink
    /// inside the store points elsewhere; identifier validation already
    /// forbids traversal tokens, this is the second, independent check.
    pub async fn resolve(&self, client: &ClientIdentifier) -> Result<PathBuf, PortalError> {
        let path = self.profile_path(client);
        let canonical = tokio::fs::canonicalize(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                PortalError::NotFound(client.to_string())
            } else {
                PortalError::from(err)
            }
        })?;
        let canonical_root = tokio::fs::canonicalize(&self.root).await?;
        if !canonical.starts_with(&canonical_root) {
            return Err(PortalError::PathEscape);
        }
        Ok(canonical)
    }

    /// Removes the profile for `client`. Absence is success at this layer;
    /// whether a missing profile is meaningful is the orchestrator's call.
    pub async fn remove(&self, client: &ClientIdentifier) -> Result<(), PortalError> {
        match tokio::fs::remove_file(self.profile_path(client)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
