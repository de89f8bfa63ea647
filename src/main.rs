// src/main.rs

//! # VPN Client Portal - Main Entry Point
//!
//! Administrative portal for OpenVPN client identities: issues PKI-backed
//! credentials through an external easy-rsa CA, packages them into
//! downloadable connection profiles, and revokes them later.
//!
//! ## Architecture Overview
//! 1. **PKI Layer**: `EasyRsaAuthority` driving the external CA process
//! 2. **Storage Layer**: `ProfileStore` owning the profile directory
//! 3. **Services Layer**: lifecycle orchestration and the admin API
//!
//! ## Environment Variables
//! - `SERVER_IP`: public address embedded in every client profile (required)
//! - `PORTAL_PASSWORD_HASH`: hex SHA-256 digest of the operator password (required)
//! - `SESSION_SECRET`: session-token signing secret (generated if unset)
//! - `BIND_ADDR`, `EASYRSA_DIR`, `CLIENT_DIR`, `CRL_FILE`, `CERT_FILE`,
//!   `KEY_FILE`: see `config.rs` for defaults

use dotenv::dotenv;
use std::sync::Arc;

use crate::config::PortalConfig;
use crate::pki::authority::EasyRsaAuthority;
use crate::services::api_server::ApiServer;
use crate::services::auth::AuthGate;
use crate::services::lifecycle::LifecycleOrchestrator;
use crate::storage::profile_store::ProfileStore;

mod config;    // environment-driven configuration
mod error;     // portal-wide error taxonomy
mod models;    // data structures
mod pki;       // CA integration and profile assembly
mod services;  // business logic and API
mod storage;   // on-disk profile store

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::init();

    let config = PortalConfig::from_env()?;

    // One-time TLS material for the admin endpoint's terminator
    pki::bootstrap::ensure_tls_material(&config).await?;

    let authority = Arc::new(EasyRsaAuthority::new(&config.easyrsa_dir));
    let store = ProfileStore::new(&config.client_dir);
    let orchestrator = LifecycleOrchestrator::new(
        authority,
        store,
        config.server_ip.clone(),
        config.crl_publish_path.clone(),
    );
    let auth = AuthGate::new(&config.password_hash, &config.session_secret)?;

    let server = ApiServer::new(orchestrator, auth);
    server.run(config.bind_addr).await
}
