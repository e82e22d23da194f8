//! Core types and machinery for the watari sync engine: persisted
//! key-value storage, configuration, the typed message bus between the
//! UI surface and the background worker, the recurring sync alarm, and
//! origin-permission bookkeeping.
//!
//! This crate performs no network I/O; service clients live in
//! `watari-api` and the orchestration glue in `watari-runtime`.

pub mod config;
pub mod error;
pub mod messages;
pub mod models;
pub mod permissions;
pub mod scheduler;
pub mod storage;

pub use error::WatariError;
