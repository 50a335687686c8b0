/*!
 * Integration tests for state that must survive a restart
 */

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use subflux::app_config::Tier;
use subflux::app_controller::Controller;
use subflux::database::store::{self, QUEUE_KEY};
use subflux::database::{KeyValueStore, SqliteStore, CACHE_KEY};
use subflux::live_view::NullView;
use subflux::providers::mock::MockProvider;
use subflux::queue::{QueueItem, QueueStatus};
use subflux::subtitle_processor::{Subtitle, TranslatedSubtitle};
use subflux::translation::TranslationCache;

use crate::common::{self, FixedProviders, ScriptedTransport, StaticSubtitles};

async fn controller_over(store: Arc<SqliteStore>) -> Result<Controller> {
    Ok(Controller::from_store(
        store,
        ScriptedTransport::new(Vec::new()),
        FixedProviders::new(MockProvider::working()),
        StaticSubtitles::empty(),
        Arc::new(NullView),
    )
    .await?)
}

#[tokio::test]
async fn test_sqliteStore_reopened_shouldKeepConfigCacheAndQueue() -> Result<()> {
    common::init_logging();
    let dir = tempfile::TempDir::new()?;
    let path = common::database_path(dir.path());

    {
        let store = Arc::new(SqliteStore::open(&path)?);
        let controller = controller_over(store.clone()).await?;
        let saved = controller
            .handle_json(&json!({"action": "saveConfig", "config": {"targetLanguage": "pt", "queue": {"itemDelayMs": 0}}}))
            .await;
        assert_eq!(saved["success"], true);

        let entry = vec![TranslatedSubtitle::from_source(&Subtitle::new(0.0, 1.0, "Hi"), "Oi")];
        controller.pipeline().cache().put("vid1", "auto", "pt", &entry).await?;

        let pending = QueueItem::new("vid2", "Later", "pt", 42);
        store::save(store.as_ref(), QUEUE_KEY, &vec![pending]).await?;
    }

    let store = Arc::new(SqliteStore::open(&path)?);
    let controller = controller_over(store.clone()).await?;

    let config = controller.pipeline().load_config().await?;
    assert_eq!(config.target_language, "pt");
    assert_eq!(config.queue.item_delay_ms, 0);

    let cached = controller.pipeline().cache().get("vid1", "auto", "pt").await?;
    assert_eq!(cached.map(|c| c[0].translated_text.clone()), Some("Oi".to_string()));

    let queue = controller.queue().list().await?;
    assert_eq!(queue[0].id, "vid2_42");
    assert_eq!(queue[0].status, QueueStatus::Pending);
    Ok(())
}

#[tokio::test]
async fn test_restart_withProcessingItem_shouldMarkInterrupted() -> Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = common::database_path(dir.path());

    {
        let store = SqliteStore::open(&path)?;
        let mut crashed = QueueItem::new("vid1", "", "fr", 1);
        crashed.status = QueueStatus::Processing;
        store::save(&store, QUEUE_KEY, &vec![crashed]).await?;
    }

    let store = Arc::new(SqliteStore::open(&path)?);
    let mut config = common::backend_config(Tier::Server, "https://svc.example.com", "");
    config.queue.item_delay_ms = 0;
    common::store_config(store.as_ref(), &config).await;
    let controller = controller_over(store.clone()).await?;

    controller.start().await?;
    tokio::time::timeout(Duration::from_secs(5), controller.queue().wait_idle()).await?;

    let items: Vec<QueueItem> = store::load(store.as_ref(), QUEUE_KEY).await?.unwrap_or_default();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, QueueStatus::Failed);
    assert_eq!(items[0].error.as_deref(), Some("interrupted"));
    assert!(items[0].completed_at.is_some());
    Ok(())
}

#[tokio::test]
async fn test_cache_corruptDocument_shouldStartEmpty() -> Result<()> {
    let dir = tempfile::TempDir::new()?;
    let store = Arc::new(SqliteStore::open(common::database_path(dir.path()))?);
    store.set(CACHE_KEY, json!({"entries": "not a map"})).await?;
    let cache = TranslationCache::new(store.clone());

    assert!(cache.get("vid1", "auto", "fr").await?.is_none());
    let entry = vec![TranslatedSubtitle::from_source(&Subtitle::new(0.0, 1.0, "Hi"), "Salut")];
    cache.put("vid1", "auto", "fr", &entry).await?;
    assert_eq!(cache.stats().await?.entries, 1);

    let raw = store.get(CACHE_KEY).await?.expect("cache document written");
    assert_eq!(raw["version"], 1);
    assert!(raw["entries"]["vid1_auto_fr"]["lastAccess"].is_number());
    Ok(())
}
