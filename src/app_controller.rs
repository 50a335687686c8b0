use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::Config;
use crate::backend::{ProcessMode, Transport};
use crate::database::KeyValueStore;
use crate::errors::AppError;
use crate::live_view::LiveView;
use crate::pipeline::{ProviderFactory, VideoPipeline};
use crate::queue::{QueueItem, QueueManager};
use crate::subtitle_processor::{Subtitle, SubtitleSource, TranslatedSubtitle};
use crate::translation::CacheStats;

// @module: Action interface of the translation core

fn default_source_language() -> String {
    "auto".to_string()
}

/// One action, with its payload
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    GetConfig,
    SaveConfig {
        // @field: Partial configuration merged into the stored one
        config: Value,
    },
    Translate {
        subtitles: Vec<Subtitle>,
        #[serde(default = "default_source_language")]
        source_language: String,
        target_language: String,
        #[serde(default)]
        video_id: Option<String>,
    },
    Process {
        video_id: String,
        target_language: String,
    },
    #[serde(rename = "stream-process")]
    StreamProcess {
        video_id: String,
        target_language: String,
    },
    GetCachedTranslation {
        video_id: String,
        #[serde(default = "default_source_language")]
        source_language: String,
        target_language: String,
    },
    ClearCache,
    GetCacheStats,
    GetQueue,
    AddToQueue {
        video_id: String,
        #[serde(default)]
        title: String,
        target_language: String,
    },
    RemoveFromQueue {
        item_id: String,
    },
    ClearCompletedQueue,
}

impl Request {
    /// Every action name the interface accepts
    pub const ACTIONS: [&'static str; 12] = [
        "getConfig",
        "saveConfig",
        "translate",
        "process",
        "stream-process",
        "getCachedTranslation",
        "clearCache",
        "getCacheStats",
        "getQueue",
        "addToQueue",
        "removeFromQueue",
        "clearCompletedQueue",
    ];

    /// Decode a raw message; `None` when it carries no action
    pub fn from_json(message: &Value) -> Result<Option<Self>, AppError> {
        let action = match message.get("action") {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(action)) => action.as_str(),
            Some(other) => return Err(AppError::InvalidRequest(format!("Action must be a string, got {}", other))),
        };
        if !Self::ACTIONS.contains(&action) {
            return Err(AppError::UnknownAction(action.to_string()));
        }
        Ok(Some(serde_json::from_value(message.clone())?))
    }
}

/// Result of an action
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    /// No-op acknowledgment
    Ack,
    Config(Config),
    Subtitles(Vec<TranslatedSubtitle>),
    CachedTranslation(Option<Vec<TranslatedSubtitle>>),
    CacheStats(CacheStats),
    Queue(Vec<QueueItem>),
    QueueItem(QueueItem),
    Removed { removed: usize },
}

/// Main application controller: dispatches actions to the pipeline and queue
pub struct Controller {
    // @field: Cache, backend and translator
    pipeline: Arc<VideoPipeline>,
    // @field: Persistent queue with its worker
    queue: Arc<QueueManager>,
}

impl Controller {
    // @method: Wire the core over its collaborators
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
        providers: Arc<dyn ProviderFactory>,
        subtitles: Arc<dyn SubtitleSource>,
        view: Arc<dyn LiveView>,
        item_delay: Duration,
    ) -> Self {
        let pipeline = Arc::new(VideoPipeline::new(store.clone(), transport, providers, subtitles, view.clone()));
        let queue = Arc::new(QueueManager::new(store, pipeline.clone(), view, item_delay));
        Self { pipeline, queue }
    }

    /// Build a controller taking the queue delay from the stored configuration
    pub async fn from_store(
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
        providers: Arc<dyn ProviderFactory>,
        subtitles: Arc<dyn SubtitleSource>,
        view: Arc<dyn LiveView>,
    ) -> Result<Self, AppError> {
        let config: Config = crate::database::store::load(store.as_ref(), crate::database::CONFIG_KEY)
            .await?
            .unwrap_or_default();
        let delay = Duration::from_millis(config.queue.item_delay_ms);
        Ok(Self::new(store, transport, providers, subtitles, view, delay))
    }

    /// Start-up: recover the queue and resume the worker if needed
    pub async fn start(&self) -> Result<(), AppError> {
        let interrupted = self.queue.recover().await?;
        info!("Controller ready ({} interrupted queue item(s) recovered)", interrupted);
        Ok(())
    }

    pub fn pipeline(&self) -> &Arc<VideoPipeline> {
        &self.pipeline
    }

    pub fn queue(&self) -> &Arc<QueueManager> {
        &self.queue
    }

    /// Dispatch one action; `None` is acknowledged without doing anything
    pub async fn handle(&self, request: Option<Request>) -> Result<Response, AppError> {
        let Some(request) = request else {
            debug!("Message without action acknowledged");
            return Ok(Response::Ack);
        };

        match request {
            Request::GetConfig => Ok(Response::Config(self.pipeline.load_config().await?)),
            Request::SaveConfig { config: partial } => {
                let current = self.pipeline.load_config().await?;
                let merged = current
                    .merged_with(&partial)
                    .map_err(|e| AppError::Config(e.to_string()))?;
                self.pipeline.save_config(&merged).await?;
                info!("Configuration saved (tier {:?})", merged.tier);
                Ok(Response::Config(merged))
            }
            Request::Translate { subtitles, source_language, target_language, video_id } => {
                let result = self
                    .pipeline
                    .translate(&subtitles, &source_language, &target_language, video_id.as_deref())
                    .await?;
                Ok(Response::Subtitles(result))
            }
            Request::Process { video_id, target_language } => {
                let result = self.pipeline.process(&video_id, &target_language, ProcessMode::Single).await?;
                Ok(Response::Subtitles(result))
            }
            Request::StreamProcess { video_id, target_language } => {
                let result = self
                    .pipeline
                    .process(&video_id, &target_language, ProcessMode::Streaming)
                    .await?;
                Ok(Response::Subtitles(result))
            }
            Request::GetCachedTranslation { video_id, source_language, target_language } => {
                let cached = self
                    .pipeline
                    .cache()
                    .get(&video_id, &source_language, &target_language)
                    .await?;
                Ok(Response::CachedTranslation(cached))
            }
            Request::ClearCache => {
                self.pipeline.cache().clear().await?;
                Ok(Response::Ack)
            }
            Request::GetCacheStats => Ok(Response::CacheStats(self.pipeline.cache().stats().await?)),
            Request::GetQueue => Ok(Response::Queue(self.queue.list().await?)),
            Request::AddToQueue { video_id, title, target_language } => {
                let item = self.queue.enqueue(&video_id, &title, &target_language).await?;
                Ok(Response::QueueItem(item))
            }
            Request::RemoveFromQueue { item_id } => {
                let item = self.queue.remove(&item_id).await?;
                Ok(Response::QueueItem(item))
            }
            Request::ClearCompletedQueue => {
                let removed = self.queue.clear_terminal().await?;
                Ok(Response::Removed { removed })
            }
        }
    }

    /// Raw JSON in, `{success, data?, error?}` out
    pub async fn handle_json(&self, message: &Value) -> Value {
        let outcome = match Request::from_json(message) {
            Ok(request) => self.handle(request).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(Response::Ack) => json!({ "success": true }),
            Ok(response) => match serde_json::to_value(&response) {
                Ok(data) => json!({ "success": true, "data": data }),
                Err(e) => json!({ "success": false, "error": e.to_string() }),
            },
            Err(e) => json!({ "success": false, "error": e.to_string() }),
        }
    }
}
