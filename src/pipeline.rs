/*!
 * End-to-end work for one video.
 *
 * `VideoPipeline` ties the pieces together: cache lookup, then either the
 * remote processing service (server and streaming tiers) or subtitle
 * fetching plus direct translation (local tier), then caching the result.
 * It also serves as the queue worker's item processor.
 */

use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;

use crate::app_config::{Config, Tier, TranslationConfig};
use crate::backend::{BackendClient, ProcessMode, Transport};
use crate::database::store::{self, KeyValueStore, CONFIG_KEY};
use crate::errors::{AppError, TranslationError};
use crate::live_view::{LiveView, ViewMessage};
use crate::progress::{BatchInfo, ProgressEvent};
use crate::providers::{self, Provider};
use crate::queue::{ItemProcessor, QueueItem};
use crate::subtitle_processor::{Subtitle, SubtitleSource, TranslatedSubtitle};
use crate::translation::{TranslationCache, TranslationService};

/// Source language used in cache keys when the service detects it
pub const AUTO_LANGUAGE: &str = "auto";

/// Builds the chat-completion client for direct translation
pub trait ProviderFactory: Send + Sync {
    fn create(&self, config: &TranslationConfig) -> Result<Arc<dyn Provider>, TranslationError>;
}

/// Builds the provider named in the configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfiguredProviders;

impl ProviderFactory for ConfiguredProviders {
    fn create(&self, config: &TranslationConfig) -> Result<Arc<dyn Provider>, TranslationError> {
        providers::from_config(config)
    }
}

/// Cache, backend, subtitle source and translator for whole videos
pub struct VideoPipeline {
    store: Arc<dyn KeyValueStore>,
    cache: Arc<TranslationCache>,
    transport: Arc<dyn Transport>,
    providers: Arc<dyn ProviderFactory>,
    subtitles: Arc<dyn SubtitleSource>,
    view: Arc<dyn LiveView>,
}

impl VideoPipeline {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
        providers: Arc<dyn ProviderFactory>,
        subtitles: Arc<dyn SubtitleSource>,
        view: Arc<dyn LiveView>,
    ) -> Self {
        Self {
            cache: Arc::new(TranslationCache::new(store.clone())),
            store,
            transport,
            providers,
            subtitles,
            view,
        }
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Stored configuration, defaults if none was saved yet
    pub async fn load_config(&self) -> Result<Config, AppError> {
        Ok(store::load(self.store.as_ref(), CONFIG_KEY).await?.unwrap_or_default())
    }

    pub async fn save_config(&self, config: &Config) -> Result<(), AppError> {
        store::save(self.store.as_ref(), CONFIG_KEY, config).await?;
        Ok(())
    }

    fn progress_sink<'a>(&'a self, video_id: Option<&'a str>) -> impl Fn(ProgressEvent) + Send + Sync + 'a {
        move |event| {
            self.view.deliver(ViewMessage::Progress {
                video_id: video_id.map(str::to_string),
                event,
            })
        }
    }

    fn translator(&self, config: &Config) -> Result<TranslationService, AppError> {
        let provider = self.providers.create(&config.translation)?;
        Ok(TranslationService::new(provider, config.translation.common.clone()))
    }

    /// Translate caller-supplied subtitles with the direct translator
    ///
    /// With a `video_id` the result is looked up in and written to the cache.
    pub async fn translate(
        &self,
        subtitles: &[Subtitle],
        source_language: &str,
        target_language: &str,
        video_id: Option<&str>,
    ) -> Result<Vec<TranslatedSubtitle>, AppError> {
        if let Some(video_id) = video_id {
            if let Some(cached) = self.cache.get(video_id, source_language, target_language).await? {
                return Ok(cached);
            }
        }

        let config = self.load_config().await?;
        let service = self.translator(&config)?;
        let on_progress = self.progress_sink(video_id);
        let result = service
            .translate(subtitles, source_language, target_language, Some(&on_progress))
            .await?;

        if let Some(video_id) = video_id {
            self.cache_result(video_id, source_language, target_language, &result).await?;
        }
        Ok(result)
    }

    /// Produce translated subtitles for a video according to the configured tier
    ///
    /// A cached result is returned without any network access.
    pub async fn process(
        &self,
        video_id: &str,
        target_language: &str,
        mode: ProcessMode,
    ) -> Result<Vec<TranslatedSubtitle>, AppError> {
        let config = self.load_config().await?;
        let source_language = Self::process_source_language(&config);

        if let Some(cached) = self.cache.get(video_id, &source_language, target_language).await? {
            info!("Using cached translation for {} ({})", video_id, target_language);
            return Ok(cached);
        }

        let on_progress = self.progress_sink(Some(video_id));
        let result = if config.tier.uses_backend() {
            let client = BackendClient::new(self.transport.clone(), config.backend.clone());
            let on_partial = |subtitles: &[TranslatedSubtitle], batch_info: Option<BatchInfo>| {
                self.view.deliver(ViewMessage::PartialResult {
                    video_id: video_id.to_string(),
                    subtitles: subtitles.to_vec(),
                    batch_info,
                })
            };
            client
                .process(video_id, target_language, mode, Some(&on_progress), Some(&on_partial))
                .await?
        } else {
            on_progress(ProgressEvent::new("fetching", "Fetching subtitles"));
            let subtitles = self
                .subtitles
                .fetch(video_id)
                .await
                .map_err(|e| AppError::Subtitle(format!("{:#}", e)))?;
            debug!("Fetched {} subtitles for {}", subtitles.len(), video_id);

            let service = self.translator(&config)?;
            service
                .translate(&subtitles, &source_language, target_language, Some(&on_progress))
                .await?
        };

        self.cache_result(video_id, &source_language, target_language, &result).await?;
        Ok(result)
    }

    /// Remote tiers detect the source language themselves
    fn process_source_language(config: &Config) -> String {
        if config.tier.uses_backend() {
            AUTO_LANGUAGE.to_string()
        } else {
            config.source_language.clone()
        }
    }

    async fn cache_result(
        &self,
        video_id: &str,
        source_language: &str,
        target_language: &str,
        result: &[TranslatedSubtitle],
    ) -> Result<(), AppError> {
        if result.is_empty() || result.iter().all(|s| s.translation_failed) {
            debug!("Not caching empty or failed translation for {}", video_id);
            return Ok(());
        }
        self.cache.put(video_id, source_language, target_language, result).await?;
        Ok(())
    }
}

#[async_trait]
impl ItemProcessor for VideoPipeline {
    async fn process_item(&self, item: &QueueItem) -> Result<(), AppError> {
        let config = self.load_config().await?;
        let mode = match config.tier {
            Tier::Streaming => ProcessMode::Streaming,
            Tier::Local | Tier::Server => ProcessMode::Single,
        };
        self.process(&item.video_id, &item.target_language, mode).await?;
        Ok(())
    }
}
