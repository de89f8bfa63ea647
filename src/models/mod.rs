// src/models/mod.rs
//! Data structures shared across the portal.

pub mod client;
