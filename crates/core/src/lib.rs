//! Core types and shared functionality for shelf.
//!
//! This crate provides:
//! - Consent policy mapping an owner's consent level to a retention window
//! - Offline work cache with SQLite backend
//! - Background cache agent that owns the store and runs eviction
//! - Foreground cache client with correlated requests and event fan-out
//! - Unified error types and layered configuration

pub mod agent;
pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod consent;
pub mod error;
pub mod protocol;

pub use agent::{AgentHandle, AgentSettings, CacheAgent, Mailbox, spawn_agent};
pub use cache::{CacheDb, CacheEntry, CacheStore};
pub use client::{CacheClient, SubscriptionId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use consent::{ConsentLevel, ConsentPolicy, RetentionDecision};
pub use error::{CacheFailure, Error};
pub use protocol::{CacheReceipt, CacheSummary, ChapterPayload, Command, DeleteReason, Event, EventKind, OfflineWork, WorkPayload};
