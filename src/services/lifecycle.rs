// src/services/lifecycle.rs
//! Client identity lifecycle orchestration.
//!
//! Drives the certificate authority and the profile store through create and
//! delete operations while keeping one invariant true: a stored profile
//! exists for a client iff the CA considers that client issued and not
//! revoked. Step ordering is chosen so that a failure mid-sequence leaves
//! the system in the safe half of any divergence.
//!
//! Each operation holds a per-identifier async lock for its full duration,
//! so two concurrent requests for the same client cannot race the CA and
//! the store out of sync.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::PortalError;
use crate::models::client::{ClientEntry, ClientIdentifier};
use crate::pki::authority::CertificateAuthority;
use crate::pki::profile;
use crate::storage::profile_store::ProfileStore;

/// Lifecycle position of one client identity.
///
/// `Absent` and `Active` are the durable states, derived from profile
/// presence in the store. `Issuing` and `Revoking` only exist while a
/// create or delete request is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Absent,
    Issuing,
    Active,
    Revoking,
}

/// Result of a successful create operation.
#[derive(Debug)]
pub struct CreatedClient {
    pub name: String,
    pub file: PathBuf,
}

/// Per-identifier mutual exclusion.
///
/// Locks are created on demand and kept for the process lifetime; the
/// identifier universe is the set of client names one operator manages, so
/// the map stays small.
struct IdentifierLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IdentifierLocks {
    fn new() -> Self {
        IdentifierLocks {
            inner: Mutex::new(HashMap::new()),
        }
    }

    async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Orchestrator tying validator, CA, assembler, and store together.
pub struct LifecycleOrchestrator {
    authority: Arc<dyn CertificateAuthority>,
    store: ProfileStore,
    server_address: String,
    crl_publish_path: PathBuf,
    locks: IdentifierLocks,
    in_flight: Mutex<HashMap<String, ClientState>>,
}

impl LifecycleOrchestrator {
    pub fn new(
        authority: Arc<dyn CertificateAuthority>,
        store: ProfileStore,
        server_address: String,
        crl_publish_path: PathBuf,
    ) -> Self {
        LifecycleOrchestrator {
            authority,
            store,
            server_address,
            crl_publish_path,
            locks: IdentifierLocks::new(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Current lifecycle state of `client`: an in-flight transient state if
    /// a request is underway, otherwise derived from profile presence.
    #[allow(dead_code)]
    pub async fn state(&self, client: &ClientIdentifier) -> ClientState {
        if let Some(state) = self.in_flight.lock().await.get(client.as_str()) {
            return *state;
        }
        if self.store.exists(client).await {
            ClientState::Active
        } else {
            ClientState::Absent
        }
    }

    async fn mark(&self, client: &ClientIdentifier, state: ClientState) {
        self.in_flight
            .lock()
            .await
            .insert(client.as_str().to_string(), state);
    }

    async fn clear(&self, client: &ClientIdentifier) {
        self.in_flight.lock().await.remove(client.as_str());
    }

    /// Issues a certificate for `raw_name` and stores its connection profile.
    ///
    /// Sequence: validate → conflict check → CA issue → assemble → store
    /// write. A CA failure leaves the state Absent (any partial key material
    /// on the CA side is not cleaned up here). If issuance succeeds but the
    /// write fails, the CA and the store now disagree; the error is surfaced
    /// and the divergence is left for operator reconciliation.
    pub async fn create(&self, raw_name: &str) -> Result<CreatedClient, PortalError> {
        let client = ClientIdentifier::parse(raw_name)?;
        let _guard = self.locks.acquire(client.as_str()).await;

        if self.store.exists(&client).await {
            return Err(PortalError::AlreadyExists(client.to_string()));
        }

        self.mark(&client, ClientState::Issuing).await;
        let result = self.create_locked(&client).await;
        self.clear(&client).await;
        result
    }

    async fn create_locked(&self, client: &ClientIdentifier) -> Result<CreatedClient, PortalError> {
        log::info!("issuing certificate for client {client}");
        let credential = self.authority.issue(client).await.map_err(|err| {
            log::warn!("issuance for {client} failed: {err}");
            err
        })?;

        let document = profile::assemble(&self.server_address, &credential);
        let file = self.store.write(client, &document).await.map_err(|err| {
            log::error!(
                "profile write for {client} failed after issuance; \
                 CA and store now disagree, reconcile by retrying delete: {err}"
            );
            err
        })?;

        log::info!("client {client} created, profile at {}", file.display());
        Ok(CreatedClient {
            name: client.to_string(),
            file,
        })
    }

    /// Revokes `raw_name` at the CA, republishes the revocation list, and
    /// removes the stored profile.
    ///
    /// The profile is removed last, only after revocation and CRL
    /// publication succeed. A crash or failure mid-sequence leaves the
    /// profile present, which is the safe divergence (a stale local file
    /// rather than a purged-but-still-trusted credential), and the
    /// operation can simply be retried.
    pub async fn delete(&self, raw_name: &str) -> Result<(), PortalError> {
        let client = ClientIdentifier::parse(raw_name)?;
        let _guard = self.locks.acquire(client.as_str()).await;

        if !self.store.exists(&client).await {
            return Err(PortalError::NotFound(client.to_string()));
        }

        self.mark(&client, ClientState::Revoking).await;
        let result = self.delete_locked(&client).await;
        self.clear(&client).await;
        result
    }

    async fn delete_locked(&self, client: &ClientIdentifier) -> Result<(), PortalError> {
        log::info!("revoking certificate for client {client}");
        self.authority.revoke(client).await.map_err(|err| {
            log::warn!("revocation for {client} failed, profile left intact: {err}");
            err
        })?;

        let crl = self.authority.regenerate_crl().await?;
        self.publish_crl(&crl).await?;

        self.store.remove(client).await?;
        log::info!("client {client} deleted");
        Ok(())
    }

    /// Copies the regenerated revocation list to the path the VPN server
    /// reads at connection time. Part of the delete sequence, not a
    /// background job.
    async fn publish_crl(&self, crl: &Path) -> Result<(), PortalError> {
        if let Some(parent) = self.crl_publish_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(crl, &self.crl_publish_path).await?;
        log::info!(
            "revocation list published to {}",
            self.crl_publish_path.display()
        );
        Ok(())
    }

    /// Enumerates issued identities from the store.
    pub async fn list(&self) -> Result<Vec<ClientEntry>, PortalError> {
        self.store.list().await
    }

    /// Resolves the profile path for `raw_name` for download.
    ///
    /// Validation happens before any filesystem access; the store then
    /// independently verifies containment of the resolved path.
    pub async fn profile_path(&self, raw_name: &str) -> Result<PathBuf, PortalError> {
        let client = ClientIdentifier::parse(raw_name)?;
        self.store.resolve(&client).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::client::IssuedCredential;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    /// Scripted CA recording its invocations.
    struct StubAuthority {
        calls: StdMutex<Vec<String>>,
        fail_issue: bool,
        fail_revoke: bool,
        crl_dir: TempDir,
    }

    impl StubAuthority {
        fn new() -> Self {
            StubAuthority {
                calls: StdMutex::new(Vec::new()),
                fail_issue: false,
                fail_revoke: false,
                crl_dir: tempfile::tempdir().unwrap(),
            }
        }

        fn failing_revoke() -> Self {
            StubAuthority {
                fail_revoke: true,
                ..Self::new()
            }
        }

        fn failing_issue() -> Self {
            StubAuthority {
                fail_issue: true,
                ..Self::new()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl CertificateAuthority for StubAuthority {
        async fn issue(&self, client: &ClientIdentifier) -> Result<IssuedCredential, PortalError> {
            self.record(format!("issue {client}"));
            if self.fail_issue {
                return Err(PortalError::Authority {
                    status: Some(1),
                    output: "issuance refused".into(),
                });
            }
            Ok(IssuedCredential {
                root_cert: "ROOT-PEM\n".into(),
                client_cert: format!("CERT-{client}\n"),
                client_key: format!("KEY-{client}\n"),
                auth_key: "TA-PEM\n".into(),
            })
        }

        async fn revoke(&self, client: &ClientIdentifier) -> Result<(), PortalError> {
            self.record(format!("revoke {client}"));
            if self.fail_revoke {
                return Err(PortalError::Authority {
                    status: Some(1),
                    output: "revocation refused".into(),
                });
            }
            Ok(())
        }

        async fn regenerate_crl(&self) -> Result<PathBuf, PortalError> {
            self.record("gen-crl".into());
            let path = self.crl_dir.path().join("crl.pem");
            std::fs::write(&path, "CRL-DATA").unwrap();
            Ok(path)
        }
    }

    struct Fixture {
        orchestrator: LifecycleOrchestrator,
        authority: Arc<StubAuthority>,
        store_dir: TempDir,
        publish_dir: TempDir,
    }

    impl Fixture {
        fn new(authority: StubAuthority) -> Self {
            let authority = Arc::new(authority);
            let store_dir = tempfile::tempdir().unwrap();
            let publish_dir = tempfile::tempdir().unwrap();
            let orchestrator = LifecycleOrchestrator::new(
                authority.clone(),
                ProfileStore::new(store_dir.path()),
                "198.51.100.4".to_string(),
                publish_dir.path().join("crl.pem"),
            );
            Fixture {
                orchestrator,
                authority,
                store_dir,
                publish_dir,
            }
        }

        fn profile_on_disk(&self, name: &str) -> bool {
            self.store_dir.path().join(format!("{name}.ovpn")).is_file()
        }
    }

    #[tokio::test]
    async fn create_issues_and_stores_profile() {
        let fx = Fixture::new(StubAuthority::new());

        let created = fx.orchestrator.create("alice").await.unwrap();
        assert_eq!(created.name, "alice");
        assert!(fx.profile_on_disk("alice"));

        let entries = fx.orchestrator.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "alice");
        assert!(entries[0].size > 0);
        assert_eq!(fx.authority.calls(), vec!["issue alice"]);
    }

    #[tokio::test]
    async fn created_profile_embeds_credential_and_header() {
        let fx = Fixture::new(StubAuthority::new());
        fx.orchestrator.create("alice").await.unwrap();

        let path = fx.orchestrator.profile_path("alice").await.unwrap();
        let body = std::fs::read_to_string(path).unwrap();
        assert!(body.contains("remote 198.51.100.4 1194"));
        assert!(body.contains("<ca>\nROOT-PEM\n</ca>"));
        assert!(body.contains("<cert>\nCERT-alice\n</cert>"));
        assert!(body.contains("<key>\nKEY-alice\n</key>"));
        assert!(body.contains("<tls-auth>\nTA-PEM\n</tls-auth>"));
    }

    #[tokio::test]
    async fn create_twice_is_a_conflict_with_one_profile() {
        let fx = Fixture::new(StubAuthority::new());
        fx.orchestrator.create("alice").await.unwrap();

        let err = fx.orchestrator.create("alice").await.unwrap_err();
        assert!(matches!(err, PortalError::AlreadyExists(_)));

        // Only the first create reached the CA.
        assert_eq!(fx.authority.calls(), vec!["issue alice"]);
        assert_eq!(fx.orchestrator.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_with_invalid_name_never_reaches_ca() {
        let fx = Fixture::new(StubAuthority::new());

        let err = fx.orchestrator.create("../../etc/passwd").await.unwrap_err();
        assert!(matches!(err, PortalError::Validation));
        assert!(fx.authority.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_issuance_leaves_state_absent() {
        let fx = Fixture::new(StubAuthority::failing_issue());

        let err = fx.orchestrator.create("alice").await.unwrap_err();
        assert!(matches!(err, PortalError::Authority { .. }));
        assert!(!fx.profile_on_disk("alice"));

        let client = ClientIdentifier::parse("alice").unwrap();
        assert_eq!(fx.orchestrator.state(&client).await, ClientState::Absent);
    }

    #[tokio::test]
    async fn delete_revokes_publishes_crl_then_removes() {
        let fx = Fixture::new(StubAuthority::new());
        fx.orchestrator.create("alice").await.unwrap();

        fx.orchestrator.delete("alice").await.unwrap();

        assert!(!fx.profile_on_disk("alice"));
        let published = fx.publish_dir.path().join("crl.pem");
        assert_eq!(std::fs::read_to_string(published).unwrap(), "CRL-DATA");
        assert_eq!(
            fx.authority.calls(),
            vec!["issue alice", "revoke alice", "gen-crl"]
        );
    }

    #[tokio::test]
    async fn delete_without_create_causes_no_ca_invocation() {
        let fx = Fixture::new(StubAuthority::new());

        let err = fx.orchestrator.delete("alice").await.unwrap_err();
        assert!(matches!(err, PortalError::NotFound(_)));
        assert!(fx.authority.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_revocation_leaves_profile_intact() {
        let fx = Fixture::new(StubAuthority::failing_revoke());
        fx.orchestrator.create("alice").await.unwrap();

        let err = fx.orchestrator.delete("alice").await.unwrap_err();
        assert!(matches!(err, PortalError::Authority { .. }));
        assert!(fx.profile_on_disk("alice"));

        let client = ClientIdentifier::parse("alice").unwrap();
        assert_eq!(fx.orchestrator.state(&client).await, ClientState::Active);
    }

    #[tokio::test]
    async fn deleting_one_client_does_not_touch_another() {
        let fx = Fixture::new(StubAuthority::new());
        fx.orchestrator.create("bob").await.unwrap();
        fx.orchestrator.create("carol").await.unwrap();

        let carol_before = std::fs::read_to_string(
            fx.store_dir.path().join("carol.ovpn"),
        )
        .unwrap();

        fx.orchestrator.delete("bob").await.unwrap();

        assert!(!fx.profile_on_disk("bob"));
        assert!(fx.profile_on_disk("carol"));
        let carol_after = std::fs::read_to_string(
            fx.store_dir.path().join("carol.ovpn"),
        )
        .unwrap();
        assert_eq!(carol_before, carol_after);
        assert_eq!(
            fx.authority.calls(),
            vec!["issue bob", "issue carol", "revoke bob", "gen-crl"]
        );
    }

    #[tokio::test]
    async fn profile_path_rejects_traversal_before_filesystem_access() {
        let fx = Fixture::new(StubAuthority::new());

        let err = fx
            .orchestrator
            .profile_path("../../etc/passwd")
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Validation));
    }

    #[tokio::test]
    async fn state_tracks_the_full_lifecycle() {
        let fx = Fixture::new(StubAuthority::new());
        let client = ClientIdentifier::parse("alice").unwrap();

        assert_eq!(fx.orchestrator.state(&client).await, ClientState::Absent);
        fx.orchestrator.create("alice").await.unwrap();
        assert_eq!(fx.orchestrator.state(&client).await, ClientState::Active);
        fx.orchestrator.delete("alice").await.unwrap();
        assert_eq!(fx.orchestrator.state(&client).await, ClientState::Absent);
    }
}
