/*!
 * Database module for persistent storage.
 *
 * This module provides a JSON key-value store with two backends:
 * - SQLite, for state that must survive restarts
 * - in-memory, for tests and throwaway runs
 */

pub mod schema;
pub mod connection;
pub mod store;

// Re-export main types
pub use connection::DatabaseConnection;
pub use store::{KeyValueStore, MemoryStore, SqliteStore, CACHE_KEY, CONFIG_KEY, QUEUE_KEY};
