//! Schema migrations for the offline works store.
//!
//! Applied versions are recorded in `_migrations`. Each pending migration
//! runs in its own transaction together with its version row, so a crash
//! mid-upgrade leaves the store at the last complete version.

use tokio_rusqlite::{Connection, params, rusqlite};

use super::Error;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration { version: 1, name: "offline_works", sql: include_str!("../../migrations/001_offline_works.sql") },
    Migration { version: 2, name: "revoked_index", sql: include_str!("../../migrations/002_revoked_index.sql") },
];

/// Bring the schema up to the latest version.
///
/// # Errors
///
/// Returns `MigrationFailed` naming the first migration that did not apply.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at INTEGER NOT NULL
            )",
            [],
        )?;

        let current: i64 = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;

        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            apply(conn, migration).map_err(|e| {
                Error::MigrationFailed(format!("{:03}_{}: {e}", migration.version, migration.name))
            })?;
            tracing::info!(version = migration.version, name = migration.name, "applied cache migration");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}

fn apply(conn: &mut rusqlite::Connection, migration: &Migration) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(migration.sql)?;
    tx.execute(
        "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
        params![migration.version, migration.name, chrono::Utc::now().timestamp_millis()],
    )?;
    tx.commit()
}
