/*!
 * Common test utilities for the subflux test suite
 */

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use subflux::app_config::{Config, TranslationCommonConfig, TranslationConfig};
use subflux::app_controller::Controller;
use subflux::backend::{ByteStream, Transport};
use subflux::database::{KeyValueStore, MemoryStore, CONFIG_KEY};
use subflux::errors::{BackendError, TranslationError};
use subflux::live_view::{LiveView, ViewMessage};
use subflux::pipeline::ProviderFactory;
use subflux::providers::mock::MockProvider;
use subflux::providers::Provider;
use subflux::subtitle_processor::{Subtitle, SubtitleSource};

/// Route library logs to the test output once
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `count` sentences that each end a subtitle, one second apart
pub fn numbered_subtitles(count: usize) -> Vec<Subtitle> {
    (0..count)
        .map(|i| Subtitle::new(i as f64, i as f64 + 0.9, format!("This is line number {}.", i + 1)))
        .collect()
}

/// Translation tunables without rate-limit pauses
pub fn fast_options() -> TranslationCommonConfig {
    TranslationCommonConfig {
        rate_limit_delay_ms: 0,
        retry_backoff_ms: 10,
        ..TranslationCommonConfig::default()
    }
}

/// Persist a configuration into a store
pub async fn store_config(store: &dyn KeyValueStore, config: &Config) {
    subflux::database::store::save(store, CONFIG_KEY, config)
        .await
        .expect("config saved");
}

/// Configuration for the remote tiers against `url`
pub fn backend_config(tier: subflux::app_config::Tier, url: &str, api_key: &str) -> Config {
    let mut config = Config::default();
    config.tier = tier;
    config.backend.url = url.to_string();
    config.backend.api_key = api_key.to_string();
    config.backend.poll_interval_ms = 10;
    config.translation.common = fast_options();
    config
}

/// A request seen by the scripted transport
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: &'static str,
    pub url: String,
    pub body: Option<Value>,
    pub bearer: Option<String>,
}

/// One canned answer
pub enum Reply {
    Json(Value),
    Stream(Vec<String>),
    Fail(BackendError),
}

/// Transport answering from a queue of canned replies and recording every call
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn record(&self, method: &'static str, url: &str, body: Option<&Value>, bearer: Option<&str>) -> Option<Reply> {
        self.calls.lock().push(RecordedCall {
            method,
            url: url.to_string(),
            body: body.cloned(),
            bearer: bearer.map(str::to_string),
        });
        self.replies.lock().pop_front()
    }

    fn json_reply(reply: Option<Reply>) -> Result<Value, BackendError> {
        match reply {
            Some(Reply::Json(value)) => Ok(value),
            Some(Reply::Fail(e)) => Err(e),
            Some(Reply::Stream(_)) => Err(BackendError::Protocol("scripted stream where JSON was expected".to_string())),
            None => Err(BackendError::Transport("no scripted reply left".to_string())),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post_json(&self, url: &str, body: &Value, bearer: Option<&str>) -> Result<Value, BackendError> {
        Self::json_reply(self.record("POST", url, Some(body), bearer))
    }

    async fn get_json(&self, url: &str, bearer: Option<&str>) -> Result<Value, BackendError> {
        Self::json_reply(self.record("GET", url, None, bearer))
    }

    async fn post_event_stream(
        &self,
        url: &str,
        body: &Value,
        bearer: Option<&str>,
    ) -> Result<ByteStream, BackendError> {
        match self.record("POST", url, Some(body), bearer) {
            Some(Reply::Stream(chunks)) => {
                let chunks: Vec<Result<Bytes, BackendError>> =
                    chunks.into_iter().map(|chunk| Ok(Bytes::from(chunk))).collect();
                Ok(futures::stream::iter(chunks).boxed())
            }
            Some(Reply::Fail(e)) => Err(e),
            Some(Reply::Json(_)) => Err(BackendError::Protocol("scripted JSON where a stream was expected".to_string())),
            None => Err(BackendError::Transport("no scripted reply left".to_string())),
        }
    }
}

/// SSE frame with a JSON payload
pub fn sse_frame(payload: &Value) -> String {
    format!("data: {}\n\n", payload)
}

/// Hands out the same mock provider whatever the configuration says
pub struct FixedProviders {
    pub provider: MockProvider,
}

impl FixedProviders {
    pub fn new(provider: MockProvider) -> Arc<Self> {
        Arc::new(Self { provider })
    }
}

impl ProviderFactory for FixedProviders {
    fn create(&self, _config: &TranslationConfig) -> Result<Arc<dyn Provider>, TranslationError> {
        Ok(Arc::new(self.provider.clone()))
    }
}

/// Source subtitles kept in memory, counting fetches
#[derive(Default)]
pub struct StaticSubtitles {
    by_video: HashMap<String, Vec<Subtitle>>,
    fetches: Mutex<usize>,
}

impl StaticSubtitles {
    pub fn with(video_id: &str, subtitles: Vec<Subtitle>) -> Arc<Self> {
        let mut by_video = HashMap::new();
        by_video.insert(video_id.to_string(), subtitles);
        Arc::new(Self { by_video, fetches: Mutex::new(0) })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fetches(&self) -> usize {
        *self.fetches.lock()
    }
}

#[async_trait]
impl SubtitleSource for StaticSubtitles {
    async fn fetch(&self, video_id: &str) -> anyhow::Result<Vec<Subtitle>> {
        *self.fetches.lock() += 1;
        self.by_video
            .get(video_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no subtitles for {}", video_id))
    }
}

/// Keeps every delivered message
#[derive(Default)]
pub struct RecordingView {
    messages: Mutex<Vec<ViewMessage>>,
}

impl RecordingView {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<ViewMessage> {
        self.messages.lock().clone()
    }
}

impl LiveView for RecordingView {
    fn deliver(&self, message: ViewMessage) {
        self.messages.lock().push(message);
    }
}

/// Everything a controller test needs to poke at
pub struct Harness {
    pub controller: Controller,
    pub store: Arc<MemoryStore>,
    pub transport: Arc<ScriptedTransport>,
    pub provider: MockProvider,
    pub subtitles: Arc<StaticSubtitles>,
    pub view: Arc<RecordingView>,
}

impl Harness {
    pub async fn new(
        config: &Config,
        replies: Vec<Reply>,
        provider: MockProvider,
        subtitles: Arc<StaticSubtitles>,
    ) -> Self {
        init_logging();
        let store = Arc::new(MemoryStore::new());
        store_config(store.as_ref(), config).await;
        let transport = ScriptedTransport::new(replies);
        let view = RecordingView::new();

        let controller = Controller::new(
            store.clone(),
            transport.clone(),
            FixedProviders::new(provider.clone()),
            subtitles.clone(),
            view.clone(),
            Duration::ZERO,
        );

        Self { controller, store, transport, provider, subtitles, view }
    }
}

/// Temporary database file path inside `dir`
pub fn database_path(dir: &Path) -> std::path::PathBuf {
    dir.join("subflux-test.db")
}
