/*!
 * Integration tests for the action interface
 */

use serde_json::json;
use std::time::Duration;

use subflux::app_config::{Config, Tier};
use subflux::app_controller::{Request, Response};
use subflux::errors::{AppError, QueueError};
use subflux::providers::mock::MockProvider;

use crate::common::{self, sse_frame, Harness, Reply, StaticSubtitles};

fn local_config() -> Config {
    let mut config = Config::default();
    config.translation.common = common::fast_options();
    config
}

#[tokio::test]
async fn test_handleJson_withoutAction_shouldAcknowledge() {
    let harness = Harness::new(&local_config(), Vec::new(), MockProvider::working(), StaticSubtitles::empty()).await;

    let reply = harness.controller.handle_json(&json!({"hello": "world"})).await;
    assert_eq!(reply, json!({"success": true}));
}

#[tokio::test]
async fn test_handleJson_unknownAction_shouldReportError() {
    let harness = Harness::new(&local_config(), Vec::new(), MockProvider::working(), StaticSubtitles::empty()).await;

    let reply = harness.controller.handle_json(&json!({"action": "selfDestruct"})).await;
    assert_eq!(reply["success"], false);
    assert_eq!(reply["error"], "Unknown action: selfDestruct");
}

#[tokio::test]
async fn test_handleJson_translate_shouldReturnSubtitles() {
    let harness = Harness::new(&local_config(), Vec::new(), MockProvider::working(), StaticSubtitles::empty()).await;

    let reply = harness
        .controller
        .handle_json(&json!({
            "action": "translate",
            "subtitles": [{"start": 0.0, "end": 1.5, "text": "Good morning."}],
            "sourceLanguage": "en",
            "targetLanguage": "fr",
            "videoId": "vid1"
        }))
        .await;

    assert_eq!(reply["success"], true);
    assert_eq!(reply["data"][0]["translatedText"], "[TRANSLATED] Good morning.");
    assert_eq!(reply["data"][0]["end"], 1.5);

    let cached = harness
        .controller
        .handle_json(&json!({
            "action": "getCachedTranslation",
            "videoId": "vid1",
            "sourceLanguage": "en",
            "targetLanguage": "fr"
        }))
        .await;
    assert_eq!(cached["data"][0]["translatedText"], "[TRANSLATED] Good morning.");
}

#[tokio::test]
async fn test_handleJson_cachedTranslationMiss_shouldReturnNullData() {
    let harness = Harness::new(&local_config(), Vec::new(), MockProvider::working(), StaticSubtitles::empty()).await;

    let reply = harness
        .controller
        .handle_json(&json!({"action": "getCachedTranslation", "videoId": "x", "targetLanguage": "fr"}))
        .await;
    assert_eq!(reply, json!({"success": true, "data": null}));
}

#[tokio::test]
async fn test_saveConfig_shouldMergeAndPersist() {
    let harness = Harness::new(&local_config(), Vec::new(), MockProvider::working(), StaticSubtitles::empty()).await;

    let response = harness
        .controller
        .handle(Some(Request::SaveConfig {
            config: json!({"tier": "streaming", "backend": {"url": "https://svc.example.com"}}),
        }))
        .await
        .unwrap();
    let Response::Config(saved) = response else {
        panic!("expected a configuration");
    };
    assert_eq!(saved.tier, Tier::Streaming);
    assert_eq!(saved.translation.common.rate_limit_delay_ms, 0);

    let reply = harness.controller.handle_json(&json!({"action": "getConfig"})).await;
    assert_eq!(reply["data"]["tier"], "streaming");
    assert_eq!(reply["data"]["backend"]["url"], "https://svc.example.com");
}

#[tokio::test]
async fn test_streamProcess_shouldUseStreamingEndpoint() {
    let config = common::backend_config(Tier::Streaming, "https://svc.example.com", "");
    let frames = sse_frame(&json!({"result": {"subtitles": [{"start": 0.0, "end": 1.0, "text": "Hi", "translatedText": "Ciao"}]}}));
    let harness = Harness::new(&config, vec![Reply::Stream(vec![frames])], MockProvider::working(), StaticSubtitles::empty()).await;

    let reply = harness
        .controller
        .handle_json(&json!({"action": "stream-process", "videoId": "vid1", "targetLanguage": "it"}))
        .await;

    assert_eq!(reply["success"], true);
    assert_eq!(reply["data"][0]["translatedText"], "Ciao");
    assert_eq!(harness.transport.calls()[0].url, "https://svc.example.com/stream");
}

#[tokio::test]
async fn test_process_backendFailure_shouldReturnErrorEnvelope() {
    let config = common::backend_config(Tier::Server, "https://api.runpod.ai/v2/abc", "");
    let harness = Harness::new(&config, Vec::new(), MockProvider::working(), StaticSubtitles::empty()).await;

    let reply = harness
        .controller
        .handle_json(&json!({"action": "process", "videoId": "vid1", "targetLanguage": "fr"}))
        .await;

    assert_eq!(reply["success"], false);
    assert!(reply["error"].as_str().unwrap().contains("API key"));
    assert_eq!(harness.transport.call_count(), 0);
}

#[tokio::test]
async fn test_queueActions_shouldAddListAndRejectDuplicates() {
    let config = common::backend_config(Tier::Server, "https://svc.example.com", "");
    let harness = Harness::new(&config, Vec::new(), MockProvider::working(), StaticSubtitles::empty()).await;
    let controller = &harness.controller;

    let added = controller
        .handle(Some(Request::AddToQueue {
            video_id: "vid1".to_string(),
            title: "Talk".to_string(),
            target_language: "fr".to_string(),
        }))
        .await
        .unwrap();
    let Response::QueueItem(item) = added else {
        panic!("expected a queue item");
    };
    assert_eq!(item.title, "Talk");

    let duplicate = controller
        .handle(Some(Request::AddToQueue {
            video_id: "vid1".to_string(),
            title: String::new(),
            target_language: "fr".to_string(),
        }))
        .await;
    // the worker may already have failed the first item; only an active one blocks
    if let Err(e) = duplicate {
        assert!(matches!(e, AppError::Queue(QueueError::Duplicate { .. })));
    }

    tokio::time::timeout(Duration::from_secs(5), controller.queue().wait_idle())
        .await
        .unwrap();

    let queue = controller.handle_json(&json!({"action": "getQueue"})).await;
    let first = &queue["data"][0];
    assert_eq!(first["videoId"], "vid1");
    // the scripted transport has no reply, so processing fails
    assert_eq!(first["status"], "failed");

    let cleared = controller.handle_json(&json!({"action": "clearCompletedQueue"})).await;
    assert_eq!(cleared["success"], true);
    assert!(cleared["data"]["removed"].as_u64().unwrap() >= 1);

    let removed = controller
        .handle_json(&json!({"action": "removeFromQueue", "itemId": "missing"}))
        .await;
    assert_eq!(removed["success"], false);
}

#[tokio::test]
async fn test_cacheActions_shouldReportStatsAndClear() {
    let harness = Harness::new(&local_config(), Vec::new(), MockProvider::working(), StaticSubtitles::empty()).await;
    let controller = &harness.controller;

    controller
        .handle_json(&json!({
            "action": "translate",
            "subtitles": [{"start": 0.0, "end": 1.0, "text": "Hello."}],
            "targetLanguage": "de",
            "videoId": "vid1"
        }))
        .await;

    let stats = controller.handle_json(&json!({"action": "getCacheStats"})).await;
    assert_eq!(stats["data"]["entries"], 1);
    assert_eq!(stats["data"]["capacity"], 100);

    let cleared = controller.handle_json(&json!({"action": "clearCache"})).await;
    assert_eq!(cleared, json!({"success": true}));

    let stats = controller.handle_json(&json!({"action": "getCacheStats"})).await;
    assert_eq!(stats["data"]["entries"], 0);
}

#[tokio::test]
async fn test_start_shouldRecoverInterruptedItems() {
    let harness = Harness::new(&local_config(), Vec::new(), MockProvider::working(), StaticSubtitles::empty()).await;
    let mut item = subflux::queue::QueueItem::new("vid1", "", "fr", 1);
    item.status = subflux::queue::QueueStatus::Processing;
    subflux::database::store::save(harness.store.as_ref(), subflux::database::QUEUE_KEY, &vec![item])
        .await
        .unwrap();

    harness.controller.start().await.unwrap();

    let queue = harness.controller.handle_json(&json!({"action": "getQueue"})).await;
    assert_eq!(queue["data"][0]["status"], "failed");
    assert_eq!(queue["data"][0]["error"], "interrupted");
}
