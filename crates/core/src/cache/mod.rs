//! SQLite-backed store for offline copies of works.
//!
//! This module provides a persistent cache keyed by document id using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Atomic upserts (re-caching overwrites, never duplicates)
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Expiry and revocation scans for the eviction sweep
//!
//! The store is owned by the background agent; nothing else writes to it.

pub mod connection;
pub mod entries;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{CacheEntry, CacheStore};
