/*!
 * Persistent translation queue.
 *
 * - `models`: `QueueItem` and its `QueueStatus` lifecycle
 * - `manager`: `QueueManager` with its single background worker
 */

pub mod manager;
pub mod models;

pub use manager::{ItemProcessor, QueueManager};
pub use models::{QueueItem, QueueStatus};
