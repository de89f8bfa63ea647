// src/services/mod.rs
//! Business logic and the administrative API.

pub mod api_server;
pub mod auth;
pub mod lifecycle;
