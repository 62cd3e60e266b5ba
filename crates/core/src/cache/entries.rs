//! Cache entry model and store operations.
//!
//! One row per cached work. Every operation touches a single statement, so a
//! write for a given document id is either fully visible or not at all.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, Row};
use tracing::warn;

use super::connection::CacheDb;
use crate::Error;
use crate::consent::ConsentLevel;
use crate::protocol::{CacheSummary, OfflineWork, WorkPayload};

/// The durable record of one cached work.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub document_id: String,
    /// Consent in effect when the copy was made; never re-derived.
    pub consent_level: ConsentLevel,
    pub payload: WorkPayload,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub refresh_count: u32,
}

impl CacheEntry {
    /// Fails with `InvalidInput` when `now + retention` is not a representable time.
    pub fn new(
        document_id: impl Into<String>, consent_level: ConsentLevel, payload: WorkPayload, now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<Self, Error> {
        let document_id = document_id.into();
        let expires_at = expiry(&document_id, now, retention)?;
        Ok(Self { document_id, consent_level, payload, cached_at: now, expires_at, revoked: false, refresh_count: 0 })
    }

    /// Grant one more retention window starting at `now`.
    ///
    /// Leaves the entry untouched on overflow.
    pub fn refresh(&mut self, now: DateTime<Utc>, retention: Duration) -> Result<(), Error> {
        self.expires_at = expiry(&self.document_id, now, retention)?;
        self.refresh_count += 1;
        Ok(())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether a reader may see this entry at `now`.
    pub fn is_readable_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired_at(now)
    }

    pub fn summary_at(&self, now: DateTime<Utc>) -> CacheSummary {
        CacheSummary {
            document_id: self.document_id.clone(),
            consent_level: self.consent_level,
            title: self.payload.title.clone(),
            chapter_count: self.payload.chapters.len(),
            cached_at: self.cached_at,
            expires_at: self.expires_at,
            refresh_count: self.refresh_count,
            is_expired: self.is_expired_at(now),
        }
    }

    pub fn into_offline_work(self) -> OfflineWork {
        OfflineWork {
            document_id: self.document_id,
            consent_level: self.consent_level,
            payload: self.payload,
            cached_at: self.cached_at,
            expires_at: self.expires_at,
        }
    }
}

fn expiry(document_id: &str, now: DateTime<Utc>, retention: Duration) -> Result<DateTime<Utc>, Error> {
    now.checked_add_signed(retention)
        .ok_or_else(|| Error::InvalidInput(format!("retention window for {document_id} overflows")))
}

/// Storage backend for cache entries.
///
/// Implementations must make each call atomic for its document id and give
/// read-your-own-write consistency to a single sequential caller.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Insert or overwrite the entry for its document id.
    async fn put(&self, entry: &CacheEntry) -> Result<(), Error>;

    async fn get(&self, document_id: &str) -> Result<Option<CacheEntry>, Error>;

    /// Delete the entry; returns whether one existed.
    async fn delete(&self, document_id: &str) -> Result<bool, Error>;

    async fn list(&self) -> Result<Vec<CacheEntry>, Error>;

    /// Entries whose persisted `expires_at` is at or before `now`.
    async fn list_expired_as_of(&self, now: DateTime<Utc>) -> Result<Vec<CacheEntry>, Error>;

    async fn list_revoked(&self) -> Result<Vec<CacheEntry>, Error>;

    /// Hide the entry from readers; returns whether one existed.
    async fn mark_revoked(&self, document_id: &str) -> Result<bool, Error>;

    /// Delete only if the persisted `expires_at` is still at or before `now`.
    async fn delete_if_expired(&self, document_id: &str, now: DateTime<Utc>) -> Result<bool, Error>;

    /// Delete rows that no longer decode; returns their document ids.
    async fn purge_corrupt(&self) -> Result<Vec<String>, Error>;
}

const SELECT_COLUMNS: &str =
    "SELECT document_id, consent_level, payload_json, cached_at, expires_at, revoked, refresh_count FROM offline_works";

/// Raw column values, decoded outside the rusqlite row callback.
struct EntryRow {
    document_id: String,
    consent_level: String,
    payload_json: String,
    cached_at: i64,
    expires_at: i64,
    revoked: bool,
    refresh_count: u32,
}

impl EntryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            document_id: row.get(0)?,
            consent_level: row.get(1)?,
            payload_json: row.get(2)?,
            cached_at: row.get(3)?,
            expires_at: row.get(4)?,
            revoked: row.get::<_, i32>(5)? == 1,
            refresh_count: row.get(6)?,
        })
    }

    fn decode(self) -> Result<CacheEntry, Error> {
        let corrupt = |reason: String| Error::CorruptRecord { document_id: self.document_id.clone(), reason };

        let consent_level = self.consent_level.parse::<ConsentLevel>().map_err(corrupt)?;
        let payload: WorkPayload =
            serde_json::from_str(&self.payload_json).map_err(|e| corrupt(format!("payload: {e}")))?;
        let cached_at = from_millis(self.cached_at).ok_or_else(|| corrupt("cached_at out of range".into()))?;
        let expires_at = from_millis(self.expires_at).ok_or_else(|| corrupt("expires_at out of range".into()))?;

        Ok(CacheEntry {
            document_id: self.document_id,
            consent_level,
            payload,
            cached_at,
            expires_at,
            revoked: self.revoked,
            refresh_count: self.refresh_count,
        })
    }
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

type Scanned = (String, Result<CacheEntry, Error>);

/// Run a `SELECT_COLUMNS` query, decoding each row on its own.
fn scan(conn: &rusqlite::Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Scanned>, Error> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| Ok((row.get::<_, String>(0)?, EntryRow::from_row(row))))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows
        .into_iter()
        .map(|(document_id, row)| (document_id, row.map_err(Error::from).and_then(EntryRow::decode)))
        .collect())
}

/// Readable entries only. Undecodable rows are skipped until the sweep purges them.
fn query_entries(conn: &rusqlite::Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<CacheEntry>, Error> {
    Ok(scan(conn, sql, params)?
        .into_iter()
        .filter_map(|(document_id, entry)| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(%document_id, error = %e, "skipping unreadable cache row");
                None
            }
        })
        .collect())
}

#[async_trait]
impl CacheStore for CacheDb {
    async fn put(&self, entry: &CacheEntry) -> Result<(), Error> {
        if entry.consent_level == ConsentLevel::Disallowed {
            return Err(Error::InvalidInput(format!("{} has no consent to be stored", entry.document_id)));
        }

        let payload_json = serde_json::to_string(&entry.payload)
            .map_err(|e| Error::InvalidInput(format!("Failed to serialize payload: {e}")))?;
        let document_id = entry.document_id.clone();
        let consent_level = entry.consent_level.as_str();
        let cached_at = entry.cached_at.timestamp_millis();
        let expires_at = entry.expires_at.timestamp_millis();
        let revoked = entry.revoked as i32;
        let refresh_count = entry.refresh_count;

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO offline_works (
                    document_id, consent_level, payload_json, cached_at, expires_at, revoked, refresh_count
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(document_id) DO UPDATE SET
                    consent_level = excluded.consent_level,
                    payload_json = excluded.payload_json,
                    cached_at = excluded.cached_at,
                    expires_at = excluded.expires_at,
                    revoked = excluded.revoked,
                    refresh_count = excluded.refresh_count",
                    params![document_id, consent_level, payload_json, cached_at, expires_at, revoked, refresh_count],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn get(&self, document_id: &str) -> Result<Option<CacheEntry>, Error> {
        let document_id = document_id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut entries =
                    query_entries(conn, &format!("{SELECT_COLUMNS} WHERE document_id = ?1"), params![document_id])?;
                Ok(entries.pop())
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, document_id: &str) -> Result<bool, Error> {
        let document_id = document_id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM offline_works WHERE document_id = ?1", params![document_id])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn list(&self) -> Result<Vec<CacheEntry>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<CacheEntry>, Error> {
                query_entries(conn, &format!("{SELECT_COLUMNS} ORDER BY cached_at DESC, document_id"), [])
            })
            .await
            .map_err(Error::from)
    }

    async fn list_expired_as_of(&self, now: DateTime<Utc>) -> Result<Vec<CacheEntry>, Error> {
        let now = now.timestamp_millis();
        self.conn
            .call(move |conn| -> Result<Vec<CacheEntry>, Error> {
                query_entries(
                    conn,
                    &format!("{SELECT_COLUMNS} WHERE expires_at <= ?1 ORDER BY expires_at, document_id"),
                    params![now],
                )
            })
            .await
            .map_err(Error::from)
    }

    async fn list_revoked(&self) -> Result<Vec<CacheEntry>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<CacheEntry>, Error> {
                query_entries(conn, &format!("{SELECT_COLUMNS} WHERE revoked = 1 ORDER BY document_id"), [])
            })
            .await
            .map_err(Error::from)
    }

    async fn mark_revoked(&self, document_id: &str) -> Result<bool, Error> {
        let document_id = document_id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count =
                    conn.execute("UPDATE offline_works SET revoked = 1 WHERE document_id = ?1", params![document_id])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete_if_expired(&self, document_id: &str, now: DateTime<Utc>) -> Result<bool, Error> {
        let document_id = document_id.to_string();
        let now = now.timestamp_millis();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute(
                    "DELETE FROM offline_works WHERE document_id = ?1 AND expires_at <= ?2",
                    params![document_id, now],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn purge_corrupt(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let corrupt: Vec<String> = scan(conn, SELECT_COLUMNS, [])?
                    .into_iter()
                    .filter(|(_, entry)| entry.is_err())
                    .map(|(document_id, _)| document_id)
                    .collect();
                for document_id in &corrupt {
                    conn.execute("DELETE FROM offline_works WHERE document_id = ?1", params![document_id])?;
                }
                Ok(corrupt)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ChapterPayload;

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn make_entry(document_id: &str, level: ConsentLevel, retention: Duration) -> CacheEntry {
        let payload = WorkPayload {
            title: format!("Title of {document_id}"),
            author: "ink".to_string(),
            chapters: vec![ChapterPayload { number: 1, content: "Once.".to_string(), ..Default::default() }],
            ..Default::default()
        };
        CacheEntry::new(document_id, level, payload, start(), retention).unwrap()
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry("w-1", ConsentLevel::FullOffline, Duration::days(30));

        db.put(&entry).await.unwrap();

        let retrieved = db.get("w-1").await.unwrap().unwrap();
        assert_eq!(retrieved, entry);
        assert_eq!(retrieved.expires_at - retrieved.cached_at, Duration::days(30));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.get("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put(&make_entry("w-1", ConsentLevel::FullOffline, Duration::days(30)))
            .await
            .unwrap();

        let mut replacement = make_entry("w-1", ConsentLevel::TransientOnly, Duration::hours(48));
        replacement.payload.title = "Second draft".to_string();
        db.put(&replacement).await.unwrap();

        let all = db.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].payload.title, "Second draft");
        assert_eq!(all[0].consent_level, ConsentLevel::TransientOnly);
    }

    #[tokio::test]
    async fn test_put_rejects_disallowed() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry("w-1", ConsentLevel::Disallowed, Duration::zero());
        assert!(db.put(&entry).await.is_err());
        assert!(db.get("w-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put(&make_entry("w-1", ConsentLevel::FullOffline, Duration::days(30)))
            .await
            .unwrap();

        assert!(db.delete("w-1").await.unwrap());
        assert!(!db.delete("w-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_expired_as_of() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put(&make_entry("short", ConsentLevel::TransientOnly, Duration::hours(48)))
            .await
            .unwrap();
        db.put(&make_entry("long", ConsentLevel::FullOffline, Duration::days(30)))
            .await
            .unwrap();

        assert!(db.list_expired_as_of(start() + Duration::hours(47)).await.unwrap().is_empty());

        let expired = db.list_expired_as_of(start() + Duration::hours(48)).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].document_id, "short");
    }

    #[tokio::test]
    async fn test_delete_if_expired_respects_refresh() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let mut entry = make_entry("w-1", ConsentLevel::TransientOnly, Duration::hours(48));
        db.put(&entry).await.unwrap();

        let sweep_time = start() + Duration::hours(49);
        entry.refresh(start() + Duration::hours(47), Duration::hours(48)).unwrap();
        db.put(&entry).await.unwrap();

        assert!(!db.delete_if_expired("w-1", sweep_time).await.unwrap());
        assert!(db.get("w-1").await.unwrap().is_some());
        assert!(db.delete_if_expired("w-1", start() + Duration::hours(95)).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_revoked() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put(&make_entry("w-1", ConsentLevel::FullOffline, Duration::days(30)))
            .await
            .unwrap();

        assert!(db.mark_revoked("w-1").await.unwrap());
        assert!(!db.mark_revoked("missing").await.unwrap());

        let revoked = db.list_revoked().await.unwrap();
        assert_eq!(revoked.len(), 1);
        assert!(revoked[0].revoked);
        assert!(!revoked[0].is_readable_at(start()));
    }

    async fn insert_unreadable_row(db: &CacheDb, document_id: &'static str) {
        db.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO offline_works (document_id, consent_level, payload_json, cached_at, expires_at)
                     VALUES (?1, 'FullOffline', 'not json', 0, 1000)",
                    params![document_id],
                )
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unreadable_row_does_not_hide_others() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put(&make_entry("w-1", ConsentLevel::TransientOnly, Duration::hours(48)))
            .await
            .unwrap();
        insert_unreadable_row(&db, "w-bad").await;

        let all = db.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].document_id, "w-1");
        assert!(db.get("w-bad").await.unwrap().is_none());

        let expired = db.list_expired_as_of(start() + Duration::hours(49)).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].document_id, "w-1");
    }

    #[tokio::test]
    async fn test_purge_corrupt_removes_only_unreadable_rows() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put(&make_entry("w-1", ConsentLevel::FullOffline, Duration::days(30)))
            .await
            .unwrap();
        insert_unreadable_row(&db, "w-bad").await;

        assert_eq!(db.purge_corrupt().await.unwrap(), vec!["w-bad".to_string()]);
        assert!(db.purge_corrupt().await.unwrap().is_empty());
        assert!(!db.delete("w-bad").await.unwrap());
        assert!(db.get("w-1").await.unwrap().is_some());
    }

    #[test]
    fn test_overflowing_retention_is_rejected() {
        let payload = WorkPayload { title: "Sky".to_string(), ..Default::default() };
        let result = CacheEntry::new("w-1", ConsentLevel::FullOffline, payload, start(), Duration::MAX);
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        let mut entry = make_entry("w-1", ConsentLevel::FullOffline, Duration::days(30));
        let before = entry.clone();
        assert!(entry.refresh(start(), Duration::seconds(10_000_000_000_000)).is_err());
        assert_eq!(entry, before);
    }

    #[test]
    fn test_refresh_starts_from_now() {
        let mut entry = make_entry("w-1", ConsentLevel::TransientOnly, Duration::hours(48));
        let refreshed_at = start() + Duration::hours(10);
        entry.refresh(refreshed_at, Duration::hours(48)).unwrap();
        assert_eq!(entry.expires_at, refreshed_at + Duration::hours(48));
        assert_eq!(entry.refresh_count, 1);
        assert_eq!(entry.cached_at, start());
    }
}
