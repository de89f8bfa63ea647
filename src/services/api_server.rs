// src/services/api_server.rs
//! Administrative REST API.
//!
//! Thin presentation layer over the lifecycle orchestrator. Every endpoint
//! except `/login` sits behind the shared authentication guard; handlers
//! translate orchestrator results into JSON responses and let
//! `PortalError`'s `IntoResponse` impl produce structured error bodies.
//!
//! # Endpoints
//! - `POST /login` — exchange the operator password for a session token
//! - `GET  /api/clients` — list issued identities with profile sizes
//! - `POST /api/clients` — issue a certificate and store the profile
//! - `DELETE /api/clients/:name` — revoke and remove an identity
//! - `GET  /api/clients/:name/profile` — download the `.ovpn` document

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::error::PortalError;
use crate::models::client::ClientEntry;
use crate::services::auth::{self, AuthGate};
use crate::services::lifecycle::LifecycleOrchestrator;

/// Request payload for operator login.
#[derive(Deserialize)]
struct LoginRequest {
    password: String,
}

/// Response containing a session token.
#[derive(Serialize)]
struct LoginResponse {
    token: String,
}

/// Response for the client listing.
#[derive(Serialize)]
struct ClientListResponse {
    clients: Vec<ClientEntry>,
}

/// Request payload for creating a client identity.
#[derive(Deserialize)]
struct CreateClientRequest {
    client_name: String,
}

/// Response for a successful create operation.
#[derive(Serialize)]
struct CreateClientResponse {
    message: String,
    client_name: String,
    file: String,
}

/// Acknowledgment for a successful delete operation.
#[derive(Serialize)]
struct DeleteClientResponse {
    message: String,
}

/// API server state shared across handlers.
#[derive(Clone)]
pub struct ApiServer {
    orchestrator: Arc<LifecycleOrchestrator>,
    auth: Arc<AuthGate>,
}

impl ApiServer {
    pub fn new(orchestrator: LifecycleOrchestrator, auth: AuthGate) -> Self {
        ApiServer {
            orchestrator: Arc::new(orchestrator),
            auth: Arc::new(auth),
        }
    }

    /// Builds the route tree: the login route is open, everything under
    /// `/api` is wrapped by the authentication guard.
    pub fn router(&self) -> Router {
        let state = Arc::new(self.clone());

        let protected = Router::new()
            .route(
                "/api/clients",
                get(Self::list_clients_handler).post(Self::create_client_handler),
            )
            .route(
                "/api/clients/:name",
                axum::routing::delete(Self::delete_client_handler),
            )
            .route(
                "/api/clients/:name/profile",
                get(Self::download_profile_handler),
            )
            .route_layer(middleware::from_fn_with_state(
                self.auth.clone(),
                auth::require_auth,
            ));

        Router::new()
            .route("/login", post(Self::login_handler))
            .merge(protected)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Binds and serves the API until the process exits.
    pub async fn run(&self, addr: SocketAddr) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        log::info!("admin portal listening on {addr}");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    /// POST /login — verify the operator password, issue a session token.
    async fn login_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<LoginRequest>,
    ) -> Result<Json<LoginResponse>, PortalError> {
        if !state.auth.verify_password(&payload.password) {
            return Err(PortalError::Unauthorized);
        }
        let token = state.auth.issue_token()?;
        Ok(Json(LoginResponse { token }))
    }

    /// GET /api/clients — enumerate issued identities.
    async fn list_clients_handler(
        State(state): State<Arc<ApiServer>>,
    ) -> Result<Json<ClientListResponse>, PortalError> {
        let clients = state.orchestrator.list().await?;
        Ok(Json(ClientListResponse { clients }))
    }

    /// POST /api/clients — create a new identity.
    async fn create_client_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<CreateClientRequest>,
    ) -> Result<Json<CreateClientResponse>, PortalError> {
        let created = state.orchestrator.create(payload.client_name.trim()).await?;
        Ok(Json(CreateClientResponse {
            message: format!("Client {} created successfully", created.name),
            client_name: created.name,
            file: created.file.display().to_string(),
        }))
    }

    /// DELETE /api/clients/:name — revoke and remove an identity.
    async fn delete_client_handler(
        State(state): State<Arc<ApiServer>>,
        Path(name): Path<String>,
    ) -> Result<Json<DeleteClientResponse>, PortalError> {
        state.orchestrator.delete(&name).await?;
        Ok(Json(DeleteClientResponse {
            message: format!("Client {name} deleted successfully"),
        }))
    }

    /// GET /api/clients/:name/profile — download the connection profile as
    /// an OpenVPN attachment.
    async fn download_profile_handler(
        State(state): State<Arc<ApiServer>>,
        Path(name): Path<String>,
    ) -> Result<Response, PortalError> {
        // Validation happens inside profile_path before any filesystem access.
        let path = state.orchestrator.profile_path(&name).await?;
        let body = tokio::fs::read(&path).await?;

        let headers = [
            (
                header::CONTENT_TYPE,
                "application/x-openvpn-profile".to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{name}.ovpn\""),
            ),
        ];
        Ok((headers, body).into_response())
    }
}
