/*!
 * SQLite document connection.
 *
 * One connection per database file, shared behind a lock. Every statement
 * runs on the blocking pool so the async callers never stall the runtime.
 * Documents are stored as JSON text under their key in `kv_store`.
 */

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::schema;

/// File name of the store under the data directory
const DB_FILENAME: &str = "subflux.db";

/// Application directory under the user's data directory
const DB_DIRNAME: &str = "subflux";

/// Shared connection to the document database
#[derive(Clone)]
pub struct DatabaseConnection {
    db_path: PathBuf,
    connection: Arc<Mutex<Connection>>,
}

impl DatabaseConnection {
    /// Open the database in the user's data directory
    pub fn new_default() -> Result<Self> {
        Self::new(Self::default_database_path()?)
    }

    /// Open or create the database file at `db_path`
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
        }

        info!("Opening document store at {:?}", db_path);
        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open database: {:?}", db_path))?;
        Self::from_connection(conn, db_path)
    }

    /// Private database that disappears with the process
    pub fn new_in_memory() -> Result<Self> {
        debug!("Opening in-memory document store");
        let conn = Connection::open_in_memory().context("Failed to create in-memory database")?;
        Self::from_connection(conn, PathBuf::from(":memory:"))
    }

    fn from_connection(conn: Connection, db_path: PathBuf) -> Result<Self> {
        schema::initialize_schema(&conn)?;
        Ok(Self {
            db_path,
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    /// `<data dir>/subflux/subflux.db`
    pub fn default_database_path() -> Result<PathBuf> {
        let base_dir = dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
            .ok_or_else(|| anyhow!("Could not determine data directory"))?;

        Ok(base_dir.join(DB_DIRNAME).join(DB_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Raw JSON text stored under `key`
    pub async fn read_document(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.with_connection(move |conn| {
            conn.query_row("SELECT value FROM kv_store WHERE key = ?1", [&key], |row| row.get(0))
                .optional()
                .with_context(|| format!("Failed to read key '{}'", key))
        })
        .await
    }

    /// Insert or replace the JSON text under `key`
    pub async fn write_document(&self, key: &str, text: String) -> Result<()> {
        let key = key.to_string();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                [&key, &text],
            )
            .with_context(|| format!("Failed to write key '{}'", key))?;
            Ok(())
        })
        .await
    }

    /// Delete the document under `key`, returning whether one existed
    pub async fn delete_document(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.with_connection(move |conn| {
            let removed = conn
                .execute("DELETE FROM kv_store WHERE key = ?1", [&key])
                .with_context(|| format!("Failed to delete key '{}'", key))?;
            Ok(removed > 0)
        })
        .await
    }

    async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.connection.clone();
        tokio::task::spawn_blocking(move || f(&conn.lock()))
            .await
            .context("Database task panicked")?
    }
}
