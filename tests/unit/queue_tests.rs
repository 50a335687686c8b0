/*!
 * Tests for the persistent queue and its worker
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use subflux::database::store::{self, QUEUE_KEY};
use subflux::database::{KeyValueStore, MemoryStore};
use subflux::errors::{AppError, QueueError};
use subflux::live_view::ViewMessage;
use subflux::queue::manager::INTERRUPTED_ERROR;
use subflux::queue::{ItemProcessor, QueueItem, QueueManager, QueueStatus};

use crate::common::{self, RecordingView};

/// Records processed videos, failing the ones listed
#[derive(Default)]
struct RecordingProcessor {
    seen: Mutex<Vec<String>>,
    fail_for: Vec<String>,
}

#[async_trait]
impl ItemProcessor for RecordingProcessor {
    async fn process_item(&self, item: &QueueItem) -> Result<(), AppError> {
        self.seen.lock().push(item.video_id.clone());
        if self.fail_for.contains(&item.video_id) {
            return Err(AppError::Subtitle(format!("no captions for {}", item.video_id)));
        }
        Ok(())
    }
}

fn manager(
    store: Arc<MemoryStore>,
    processor: Arc<RecordingProcessor>,
    view: Arc<RecordingView>,
) -> Arc<QueueManager> {
    common::init_logging();
    Arc::new(QueueManager::new(store, processor, view, Duration::ZERO))
}

async fn wait_idle(manager: &QueueManager) {
    tokio::time::timeout(Duration::from_secs(5), manager.wait_idle())
        .await
        .expect("queue drained in time");
}

#[tokio::test]
async fn test_enqueue_shouldProcessInOrderAndComplete() {
    let processor = Arc::new(RecordingProcessor::default());
    let queue = manager(Arc::new(MemoryStore::new()), processor.clone(), RecordingView::new());

    queue.enqueue("vid1", "First", "fr").await.unwrap();
    queue.enqueue("vid2", "Second", "fr").await.unwrap();
    wait_idle(&queue).await;

    assert_eq!(*processor.seen.lock(), vec!["vid1".to_string(), "vid2".to_string()]);
    let items = queue.list().await.unwrap();
    assert_eq!(items.len(), 2);
    for item in &items {
        assert_eq!(item.status, QueueStatus::Completed);
        assert!(item.completed_at.is_some());
        assert!(item.error.is_none());
    }
    assert!(!queue.is_running());
}

#[tokio::test]
async fn test_enqueue_duplicateActiveJob_shouldBeRejected() {
    let store = Arc::new(MemoryStore::new());
    let existing = QueueItem::new("vid1", "", "fr", 1);
    store::save(store.as_ref(), QUEUE_KEY, &vec![existing]).await.unwrap();
    let queue = manager(store, Arc::new(RecordingProcessor::default()), RecordingView::new());

    let err = queue.enqueue("vid1", "again", "fr").await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Queue(QueueError::Duplicate { ref video_id, ref target_language })
            if video_id == "vid1" && target_language == "fr"
    ));

    // another target language is a different job
    queue.enqueue("vid1", "", "de").await.unwrap();
    wait_idle(&queue).await;
}

#[tokio::test]
async fn test_enqueue_afterCompletion_shouldAllowSameJobAgain() {
    let queue = manager(
        Arc::new(MemoryStore::new()),
        Arc::new(RecordingProcessor::default()),
        RecordingView::new(),
    );

    queue.enqueue("vid1", "", "fr").await.unwrap();
    wait_idle(&queue).await;
    let second = queue.enqueue("vid1", "", "fr").await.unwrap();
    wait_idle(&queue).await;

    let items = queue.list().await.unwrap();
    assert_eq!(items.len(), 2);
    assert_ne!(items[0].id, second.id);
}

#[tokio::test]
async fn test_worker_failingItem_shouldRecordErrorAndContinue() {
    let processor = Arc::new(RecordingProcessor {
        fail_for: vec!["broken".to_string()],
        ..RecordingProcessor::default()
    });
    let queue = manager(Arc::new(MemoryStore::new()), processor.clone(), RecordingView::new());

    queue.enqueue("broken", "", "fr").await.unwrap();
    queue.enqueue("fine", "", "fr").await.unwrap();
    wait_idle(&queue).await;

    let items = queue.list().await.unwrap();
    assert_eq!(items[0].status, QueueStatus::Failed);
    assert!(items[0].error.as_deref().unwrap_or_default().contains("no captions for broken"));
    assert_eq!(items[1].status, QueueStatus::Completed);
}

#[tokio::test]
async fn test_recover_shouldFailInterruptedAndResumePending() {
    let store = Arc::new(MemoryStore::new());
    let mut interrupted = QueueItem::new("crashed", "", "fr", 1);
    interrupted.status = QueueStatus::Processing;
    let pending = QueueItem::new("waiting", "", "fr", 2);
    store::save(store.as_ref(), QUEUE_KEY, &vec![interrupted, pending]).await.unwrap();

    let processor = Arc::new(RecordingProcessor::default());
    let queue = manager(store, processor.clone(), RecordingView::new());

    assert_eq!(queue.recover().await.unwrap(), 1);
    wait_idle(&queue).await;

    let items = queue.list().await.unwrap();
    assert_eq!(items[0].status, QueueStatus::Failed);
    assert_eq!(items[0].error.as_deref(), Some(INTERRUPTED_ERROR));
    assert_eq!(items[1].status, QueueStatus::Completed);
    assert_eq!(*processor.seen.lock(), vec!["waiting".to_string()]);
}

#[tokio::test]
async fn test_remove_and_clearTerminal_shouldEditList() {
    let store = Arc::new(MemoryStore::new());
    let mut done = QueueItem::new("done", "", "fr", 1);
    done.status = QueueStatus::Completed;
    let mut failed = QueueItem::new("failed", "", "fr", 2);
    failed.status = QueueStatus::Failed;
    let mut running = QueueItem::new("running", "", "fr", 3);
    running.status = QueueStatus::Processing;
    store::save(store.as_ref(), QUEUE_KEY, &vec![done, failed, running.clone()]).await.unwrap();
    let queue = manager(store, Arc::new(RecordingProcessor::default()), RecordingView::new());

    assert_eq!(queue.clear_terminal().await.unwrap(), 2);
    assert_eq!(queue.list().await.unwrap(), vec![running.clone()]);

    let removed = queue.remove(&running.id).await.unwrap();
    assert_eq!(removed.video_id, "running");
    assert!(queue.list().await.unwrap().is_empty());

    let err = queue.remove("missing_1").await.unwrap_err();
    assert!(matches!(err, AppError::Queue(QueueError::NotFound(_))));
}

#[tokio::test]
async fn test_every_change_shouldPushQueueUpdate() {
    let view = RecordingView::new();
    let queue = manager(Arc::new(MemoryStore::new()), Arc::new(RecordingProcessor::default()), view.clone());

    queue.enqueue("vid1", "", "fr").await.unwrap();
    wait_idle(&queue).await;

    let snapshots: Vec<Vec<QueueStatus>> = view
        .messages()
        .into_iter()
        .filter_map(|m| match m {
            ViewMessage::QueueUpdated { items } => Some(items.iter().map(|i| i.status).collect()),
            _ => None,
        })
        .collect();
    assert_eq!(
        snapshots,
        vec![
            vec![QueueStatus::Pending],
            vec![QueueStatus::Processing],
            vec![QueueStatus::Completed],
        ]
    );
}

#[tokio::test]
async fn test_queue_shouldPersistUnderQueueKey() {
    let store = Arc::new(MemoryStore::new());
    let queue = manager(store.clone(), Arc::new(RecordingProcessor::default()), RecordingView::new());

    let item = queue.enqueue("vid1", "Title", "ja").await.unwrap();
    wait_idle(&queue).await;

    let raw = store.get(QUEUE_KEY).await.unwrap().expect("queue stored");
    assert_eq!(raw[0]["id"], item.id.as_str());
    assert_eq!(raw[0]["videoId"], "vid1");
    assert_eq!(raw[0]["targetLanguage"], "ja");
    assert_eq!(raw[0]["status"], "completed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_waitIdle_withEnqueueRacingWorkerExit_shouldWaitForNewWorker() {
    let processor = Arc::new(RecordingProcessor::default());
    let queue = manager(Arc::new(MemoryStore::new()), processor.clone(), RecordingView::new());

    for round in 0..50 {
        queue.enqueue(&format!("first{}", round), "", "fr").await.unwrap();
        let racer = Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            racer.enqueue(&format!("second{}", round), "", "fr").await
        })
        .await
        .unwrap()
        .unwrap();

        wait_idle(&queue).await;
        let items = queue.list().await.unwrap();
        assert!(
            items.iter().all(|i| i.status == QueueStatus::Completed),
            "round {} left unfinished items",
            round
        );
    }
    assert_eq!(processor.seen.lock().len(), 100);
}
