// src/storage/mod.rs
//! Persistent storage of issued connection profiles.

pub mod profile_store;
