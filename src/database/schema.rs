/*!
 * Document table layout.
 *
 * The store is a single key-value table of JSON documents, tagged with a
 * `schema_version` row. Files written by a newer layout are refused rather
 * than read with the wrong assumptions.
 */

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use rusqlite::Connection;

/// Layout written by this build
pub const SCHEMA_VERSION: i32 = 1;

/// Create the tables on a fresh file and check the version of an existing one
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    match schema_version(conn)? {
        0 => {
            info!("Creating document store schema v{}", SCHEMA_VERSION);
            create_tables(conn)?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (id, version, updated_at) VALUES (1, ?1, datetime('now'))",
                [SCHEMA_VERSION],
            )?;
            Ok(())
        }
        SCHEMA_VERSION => {
            debug!("Document store schema is v{}", SCHEMA_VERSION);
            Ok(())
        }
        other => Err(anyhow!(
            "Database uses schema v{}, this build only understands v{}",
            other,
            SCHEMA_VERSION
        )),
    }
}

/// Stored layout version, 0 for a file without one
fn schema_version(conn: &Connection) -> Result<i32> {
    let has_table: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get(0),
        )
        .context("Failed to check schema_version table existence")?;
    if !has_table {
        return Ok(0);
    }

    Ok(conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0))
}

fn create_tables(conn: &Connection) -> Result<()> {
    // WAL keeps the last committed document readable after a crash
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .context("Failed to create document tables")
}
