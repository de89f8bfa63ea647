// src/pki/mod.rs
//! Certificate authority integration and profile construction.

pub mod authority;
pub mod bootstrap;
pub mod profile;
