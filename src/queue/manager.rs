/*!
 * Persistent translation queue and its single worker.
 *
 * The queue is a flat ordered list stored under `translationQueue`. Every
 * mutation re-reads the list, changes it and writes it back while holding
 * the queue's write lock. One worker task at most drains Pending items in
 * order; an item is marked Processing and persisted before any work starts
 * so a crash leaves a visible trace.
 */

use async_trait::async_trait;
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::database::store::{self, KeyValueStore, QUEUE_KEY};
use crate::errors::{AppError, QueueError};
use crate::live_view::{LiveView, ViewMessage};

use super::models::{QueueItem, QueueStatus};

/// Error recorded on items left in Processing by a previous run
pub const INTERRUPTED_ERROR: &str = "interrupted";

/// Work performed for one queue item
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    async fn process_item(&self, item: &QueueItem) -> Result<(), AppError>;
}

/// Persistent queue with a single background worker
pub struct QueueManager {
    store: Arc<dyn KeyValueStore>,
    processor: Arc<dyn ItemProcessor>,
    view: Arc<dyn LiveView>,
    item_delay: Duration,
    /// Serializes read-modify-write cycles on the list
    write_lock: tokio::sync::Mutex<()>,
    /// Set while a worker task owns the queue
    running: AtomicBool,
    busy: watch::Sender<bool>,
}

impl QueueManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        processor: Arc<dyn ItemProcessor>,
        view: Arc<dyn LiveView>,
        item_delay: Duration,
    ) -> Self {
        let (busy, _) = watch::channel(false);
        Self {
            store,
            processor,
            view,
            item_delay,
            write_lock: tokio::sync::Mutex::new(()),
            running: AtomicBool::new(false),
            busy,
        }
    }

    /// Current list, oldest first
    pub async fn list(&self) -> Result<Vec<QueueItem>, AppError> {
        Ok(store::load(self.store.as_ref(), QUEUE_KEY).await?.unwrap_or_default())
    }

    async fn save(&self, items: &[QueueItem]) -> Result<(), AppError> {
        store::save(self.store.as_ref(), QUEUE_KEY, items).await?;
        self.view.deliver(ViewMessage::QueueUpdated { items: items.to_vec() });
        Ok(())
    }

    /// Add a job and wake the worker
    ///
    /// Rejected when the same video and target language is already Pending
    /// or Processing.
    pub async fn enqueue(
        self: &Arc<Self>,
        video_id: &str,
        title: &str,
        target_language: &str,
    ) -> Result<QueueItem, AppError> {
        let item = {
            let _guard = self.write_lock.lock().await;
            let mut items = self.list().await?;

            if items
                .iter()
                .any(|i| i.status.is_active() && i.same_job(video_id, target_language))
            {
                return Err(QueueError::Duplicate {
                    video_id: video_id.to_string(),
                    target_language: target_language.to_string(),
                }
                .into());
            }

            let mut added_at = chrono::Utc::now().timestamp_millis();
            while items.iter().any(|i| i.id == format!("{}_{}", video_id, added_at)) {
                added_at += 1;
            }
            let item = QueueItem::new(video_id, title, target_language, added_at);
            items.push(item.clone());
            self.save(&items).await?;
            item
        };

        info!("Queued {} for {}", item.video_id, item.target_language);
        self.start_worker();
        Ok(item)
    }

    /// Mark the oldest Pending item as Processing and return it
    pub async fn dequeue_next(&self) -> Result<Option<QueueItem>, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut items = self.list().await?;

        let Some(next) = items
            .iter_mut()
            .filter(|i| i.status == QueueStatus::Pending)
            .min_by_key(|i| i.added_at)
        else {
            return Ok(None);
        };

        next.status = QueueStatus::Processing;
        let picked = next.clone();
        self.save(&items).await?;
        Ok(Some(picked))
    }

    /// Delete one item
    pub async fn remove(&self, item_id: &str) -> Result<QueueItem, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut items = self.list().await?;

        let position = items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(|| QueueError::NotFound(item_id.to_string()))?;
        let removed = items.remove(position);
        self.save(&items).await?;
        Ok(removed)
    }

    /// Drop Completed and Failed items, returning how many were removed
    pub async fn clear_terminal(&self) -> Result<usize, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut items = self.list().await?;

        let before = items.len();
        items.retain(|i| !i.status.is_terminal());
        let removed = before - items.len();
        if removed > 0 {
            self.save(&items).await?;
        }
        Ok(removed)
    }

    /// Start-up pass: fail items a previous run left in Processing, then
    /// start the worker if anything is Pending
    pub async fn recover(self: &Arc<Self>) -> Result<usize, AppError> {
        let (interrupted, pending) = {
            let _guard = self.write_lock.lock().await;
            let mut items = self.list().await?;
            let now = chrono::Utc::now().timestamp_millis();

            let mut interrupted = 0;
            for item in items.iter_mut().filter(|i| i.status == QueueStatus::Processing) {
                item.status = QueueStatus::Failed;
                item.completed_at = Some(now);
                item.error = Some(INTERRUPTED_ERROR.to_string());
                interrupted += 1;
            }
            if interrupted > 0 {
                warn!("Marked {} interrupted queue item(s) as failed", interrupted);
                self.save(&items).await?;
            }
            (interrupted, items.iter().any(|i| i.status == QueueStatus::Pending))
        };

        if pending {
            self.start_worker();
        }
        Ok(interrupted)
    }

    /// Whether the worker task is alive
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the worker unless one is already running
    pub fn start_worker(self: &Arc<Self>) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        self.busy.send_replace(true);
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.run_worker().await;
        });
        true
    }

    /// Wait until the worker has drained the queue
    pub async fn wait_idle(&self) {
        let mut receiver = self.busy.subscribe();
        let _ = receiver.wait_for(|busy| !*busy).await;
    }

    async fn run_worker(self: Arc<Self>) {
        info!("Queue worker started");
        loop {
            self.drain().await;
            self.running.store(false, Ordering::SeqCst);

            // An enqueue may have slipped in after the last empty dequeue
            let pending = matches!(
                self.list().await,
                Ok(items) if items.iter().any(|i| i.status == QueueStatus::Pending)
            );
            if pending
                && self
                    .running
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                continue;
            }
            break;
        }
        info!("Queue worker idle");
        // A worker started by a racing enqueue owns the flag from here on
        self.busy.send_if_modified(|busy| {
            let idle = !self.running.load(Ordering::SeqCst);
            let changed = idle && *busy;
            if changed {
                *busy = false;
            }
            changed
        });
    }

    async fn drain(&self) {
        loop {
            let item = match self.dequeue_next().await {
                Ok(Some(item)) => item,
                Ok(None) => return,
                Err(e) => {
                    error!("Queue worker could not read the queue: {}", e);
                    return;
                }
            };

            info!("Processing queue item {} ({} -> {})", item.id, item.video_id, item.target_language);
            let outcome = self.processor.process_item(&item).await;
            if let Err(e) = self.finish(&item.id, outcome).await {
                error!("Failed to record result of queue item {}: {}", item.id, e);
            }

            if !self.item_delay.is_zero() {
                tokio::time::sleep(self.item_delay).await;
            }
        }
    }

    async fn finish(&self, item_id: &str, outcome: Result<(), AppError>) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        let mut items = self.list().await?;

        let Some(item) = items.iter_mut().find(|i| i.id == item_id) else {
            warn!("Queue item {} was removed while processing", item_id);
            return Ok(());
        };

        item.completed_at = Some(chrono::Utc::now().timestamp_millis());
        match outcome {
            Ok(()) => {
                info!("Queue item {} completed", item_id);
                item.status = QueueStatus::Completed;
                item.error = None;
            }
            Err(e) => {
                error!("Queue item {} failed: {}", item_id, e);
                item.status = QueueStatus::Failed;
                item.error = Some(e.to_string());
            }
        }
        self.save(&items).await
    }
}
