//! Command and event messages exchanged between clients and the agent.
//!
//! Every value crossing the boundary is owned and moved through a channel;
//! nothing is shared by reference. The serde encoding is the wire format:
//! a `type` tag in SCREAMING_SNAKE_CASE and camelCase fields.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::consent::ConsentLevel;
use crate::error::CacheFailure;

/// Work content needed to render it without a connection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct WorkPayload {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub rating: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub word_count: u64,
    #[serde(default)]
    pub is_complete: bool,
    #[serde(default)]
    pub chapters: Vec<ChapterPayload>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ChapterPayload {
    pub number: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub notes: String,
    pub content: String,
    #[serde(default)]
    pub word_count: u64,
}

/// Listing row for one cached work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSummary {
    pub document_id: String,
    pub consent_level: ConsentLevel,
    pub title: String,
    pub chapter_count: usize,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub refresh_count: u32,
    /// Expiry as computed when the listing was produced.
    pub is_expired: bool,
}

impl CacheSummary {
    /// Re-derive expiry; listings can outlive the moment they were fetched.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A readable offline copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineWork {
    pub document_id: String,
    pub consent_level: ConsentLevel,
    pub payload: WorkPayload,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Successful outcome of a cache or refresh command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheReceipt {
    pub document_id: String,
    pub consent_level: ConsentLevel,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum Command {
    CacheWorkWithConsent { document_id: String, payload: WorkPayload, consent_level: ConsentLevel },
    ClearConsentCache { document_id: String },
    GetOfflineWorks {},
    GetOfflineWork { document_id: String },
    RefreshRetention { document_id: String },
    RevokeConsent { document_id: String },
    SweepExpired {},
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::CacheWorkWithConsent { .. } => "CACHE_WORK_WITH_CONSENT",
            Command::ClearConsentCache { .. } => "CLEAR_CONSENT_CACHE",
            Command::GetOfflineWorks {} => "GET_OFFLINE_WORKS",
            Command::GetOfflineWork { .. } => "GET_OFFLINE_WORK",
            Command::RefreshRetention { .. } => "REFRESH_RETENTION",
            Command::RevokeConsent { .. } => "REVOKE_CONSENT",
            Command::SweepExpired {} => "SWEEP_EXPIRED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteReason {
    /// The reader removed the copy.
    Manual,
    /// The owner deleted the work or withdrew consent.
    Revoked,
}

/// Lifecycle events broadcast to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum Event {
    WorkCachedWithConsent { document_id: String, consent_level: ConsentLevel, expires_at: DateTime<Utc> },
    WorkDeleted { document_id: String, reason: DeleteReason },
    WorkExpired { document_id: String },
    WorkCacheFailed { document_id: String, reason: CacheFailure },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::WorkCachedWithConsent { .. } => EventKind::Cached,
            Event::WorkDeleted { .. } => EventKind::Deleted,
            Event::WorkExpired { .. } => EventKind::Expired,
            Event::WorkCacheFailed { .. } => EventKind::CacheFailed,
        }
    }

    pub fn document_id(&self) -> &str {
        match self {
            Event::WorkCachedWithConsent { document_id, .. }
            | Event::WorkDeleted { document_id, .. }
            | Event::WorkExpired { document_id }
            | Event::WorkCacheFailed { document_id, .. } => document_id,
        }
    }
}

/// Event type used to key subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Cached,
    Deleted,
    Expired,
    CacheFailed,
}

/// Terminal answer to one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Outcome {
    Event { event: Event },
    Works { works: Vec<CacheSummary> },
    Work { work: Option<OfflineWork> },
    Swept { document_ids: Vec<String> },
    Failed { reason: CacheFailure },
}

/// A reply routed back to the issuing client by correlation token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub token: Uuid,
    pub outcome: Outcome,
}

/// A command in flight, with the channel its reply goes back on.
#[derive(Debug)]
pub struct Envelope {
    pub token: Uuid,
    pub reply_to: mpsc::UnboundedSender<Reply>,
    pub command: Command,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_wire_format() {
        let command = Command::CacheWorkWithConsent {
            document_id: "w-1".to_string(),
            payload: WorkPayload { title: "Sky".to_string(), ..Default::default() },
            consent_level: ConsentLevel::FullOffline,
        };
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["type"], "CACHE_WORK_WITH_CONSENT");
        assert_eq!(value["documentId"], "w-1");
        assert_eq!(value["consentLevel"], "FullOffline");
        assert_eq!(command.name(), "CACHE_WORK_WITH_CONSENT");

        let clear: Command = serde_json::from_value(json!({"type": "CLEAR_CONSENT_CACHE", "documentId": "w-2"})).unwrap();
        assert_eq!(clear, Command::ClearConsentCache { document_id: "w-2".to_string() });

        let list: Command = serde_json::from_value(json!({"type": "GET_OFFLINE_WORKS"})).unwrap();
        assert_eq!(list, Command::GetOfflineWorks {});
    }

    #[test]
    fn test_event_wire_format() {
        let deleted = Event::WorkDeleted { document_id: "w-1".to_string(), reason: DeleteReason::Manual };
        let value = serde_json::to_value(&deleted).unwrap();
        assert_eq!(value, json!({"type": "WORK_DELETED", "documentId": "w-1", "reason": "manual"}));

        let failed = Event::WorkCacheFailed { document_id: "w-1".to_string(), reason: CacheFailure::ConsentDenied };
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["type"], "WORK_CACHE_FAILED");
        assert_eq!(value["reason"], "ConsentDenied");
    }

    #[test]
    fn test_event_accessors() {
        let expired = Event::WorkExpired { document_id: "w-9".to_string() };
        assert_eq!(expired.kind(), EventKind::Expired);
        assert_eq!(expired.document_id(), "w-9");
    }

    #[test]
    fn test_summary_expiry_is_derived() {
        let cached_at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let summary = CacheSummary {
            document_id: "w-1".to_string(),
            consent_level: ConsentLevel::TransientOnly,
            title: "Sky".to_string(),
            chapter_count: 1,
            cached_at,
            expires_at: cached_at + chrono::Duration::hours(48),
            refresh_count: 0,
            is_expired: false,
        };
        assert!(!summary.is_expired_at(cached_at + chrono::Duration::hours(47)));
        assert!(summary.is_expired_at(cached_at + chrono::Duration::hours(48)));
    }
}
