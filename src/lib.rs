//! Event management with a local sqlite cache kept in agreement with a
//! remote HTTP API.
//!
//! The remote system is the source of truth for writes; the cache is a
//! read-through copy with last-known-good fallback. The [`sync`] module
//! reconciles the two sets under a last-writer-wins conflict rule.

pub mod api;
pub mod commands;
pub mod config;
pub mod db;
pub mod models;
pub mod repo;
pub mod sync;
