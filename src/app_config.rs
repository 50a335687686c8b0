use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::BackendProtocol;

/// Application configuration module
/// This module handles the configuration: which tier is active, provider
/// credentials for direct translation, the remote processing service and
/// the tunables of the translator and queue. The configuration is stored
/// as JSON in the persistent key-value store.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Where translation happens
    #[serde(default)]
    pub tier: Tier,

    /// Source language code (ISO), "auto" lets the model decide
    #[serde(default = "default_source_language")]
    pub source_language: String,

    /// Target language code (ISO)
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Direct translation config
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Remote processing service config
    #[serde(default)]
    pub backend: BackendConfig,

    /// Queue worker config
    #[serde(default)]
    pub queue: QueueConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Backend topology
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    // @tier: Client calls the chat-completion API itself
    #[default]
    Local,
    // @tier: Remote service, single result
    Server,
    // @tier: Remote service, progressive partial results
    Streaming,
}

impl Tier {
    /// Whether subtitles are produced by the remote processing service
    pub fn uses_backend(&self) -> bool {
        !matches!(self, Self::Local)
    }
}

/// Chat-completion provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    // @provider: OpenAI-compatible chat completions
    #[default]
    OpenAI,
    // @provider: Anthropic messages API
    Anthropic,
}

impl TranslationProvider {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::OpenAI => "openai".to_string(),
            Self::Anthropic => "anthropic".to_string(),
        }
    }
}

impl std::fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for TranslationProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name
    #[serde(default)]
    pub model: String,

    // @field: API key
    #[serde(default)]
    pub api_key: String,

    // @field: Service URL
    #[serde(default)]
    pub endpoint: String,

    // @field: Timeout seconds
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: TranslationProvider) -> Self {
        match provider_type {
            TranslationProvider::OpenAI => Self {
                provider_type: "openai".to_string(),
                model: default_openai_model(),
                api_key: String::new(),
                endpoint: default_openai_endpoint(),
                timeout_secs: default_provider_timeout_secs(),
            },
            TranslationProvider::Anthropic => Self {
                provider_type: "anthropic".to_string(),
                model: default_anthropic_model(),
                api_key: String::new(),
                endpoint: default_anthropic_endpoint(),
                timeout_secs: default_provider_timeout_secs(),
            },
        }
    }
}

/// Direct translation configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranslationConfig {
    /// Translation provider to use
    #[serde(default)]
    pub provider: TranslationProvider,

    /// Available translation providers
    #[serde(default = "default_available_providers")]
    pub available_providers: Vec<ProviderConfig>,

    /// Common translation settings
    #[serde(default)]
    pub common: TranslationCommonConfig,
}

/// Settings applicable to all providers
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranslationCommonConfig {
    /// Merged units per request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Characters of neighbouring text given as context
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,

    /// Delay in milliseconds between consecutive batches
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,

    /// Retries per batch for transport failures
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Backoff base for retries (in milliseconds), doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Share of unchanged lines above which a batch counts as untranslated
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold: f64,

    /// Temperature parameter for text generation (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Merge fragments into sentences before translating
    #[serde(default = "default_true")]
    pub sentence_merge: bool,

    /// Run the fluency refinement pass
    #[serde(default)]
    pub multi_pass: bool,
}

impl Default for TranslationCommonConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            context_chars: default_context_chars(),
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            stale_threshold: default_stale_threshold(),
            temperature: default_temperature(),
            sentence_merge: true,
            multi_pass: false,
        }
    }
}

/// Remote processing service configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// Service base URL; its shape selects the wire protocol
    #[serde(default)]
    pub url: String,

    /// Bearer token
    #[serde(default)]
    pub api_key: String,

    /// Ask the service to transcribe even when captions exist
    #[serde(default)]
    pub force_whisper: bool,

    /// Overall deadline for synchronous and SSE calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Overall deadline for job submission plus polling
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// Interval between job status polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            force_whisper: false,
            request_timeout_secs: default_request_timeout_secs(),
            job_timeout_secs: default_job_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl BackendConfig {
    /// Bearer token, if one is configured
    pub fn bearer(&self) -> Option<&str> {
        let key = self.api_key.trim();
        (!key.is_empty()).then_some(key)
    }
}

/// Queue worker configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    /// Pause between two queue items
    #[serde(default = "default_item_delay_ms")]
    pub item_delay_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { item_delay_ms: default_item_delay_ms() }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_source_language() -> String {
    "auto".to_string()
}

fn default_target_language() -> String {
    "en".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    120
}

fn default_batch_size() -> usize {
    25
}

fn default_context_chars() -> usize {
    100
}

fn default_rate_limit_delay_ms() -> u64 {
    400
}

fn default_retry_count() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_stale_threshold() -> f64 {
    0.5
}

fn default_temperature() -> f32 {
    0.3
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_job_timeout_secs() -> u64 {
    1800
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_item_delay_ms() -> u64 {
    1000
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_anthropic_endpoint() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

fn default_available_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::new(TranslationProvider::OpenAI),
        ProviderConfig::new(TranslationProvider::Anthropic),
    ]
}

impl Config {
    /// Validate the configuration for the active tier
    pub fn validate(&self) -> Result<()> {
        if self.target_language.trim().is_empty() {
            return Err(anyhow!("Target language is required"));
        }

        match self.tier {
            Tier::Local => {
                if self.translation.get_api_key().is_empty() {
                    return Err(anyhow!(
                        "Translation API key is required for {} provider",
                        self.translation.provider.display_name()
                    ));
                }
                if self.translation.get_model().is_empty() {
                    return Err(anyhow!("A model must be configured for direct translation"));
                }
            }
            Tier::Server | Tier::Streaming => {
                if self.backend.url.trim().is_empty() {
                    return Err(anyhow!("Backend URL is required for the {:?} tier", self.tier));
                }
                let protocol = BackendProtocol::detect(&self.backend.url)?;
                if matches!(protocol, BackendProtocol::Job { .. }) && self.backend.bearer().is_none() {
                    return Err(anyhow!("An API key is required for job-based backend URLs"));
                }
            }
        }

        Ok(())
    }

    /// Apply a partial JSON object on top of this configuration
    pub fn merged_with(&self, partial: &Value) -> Result<Config> {
        if !partial.is_object() {
            return Err(anyhow!("Configuration update must be a JSON object"));
        }
        let mut current = serde_json::to_value(self)?;
        merge_json(&mut current, partial);
        serde_json::from_value(current).map_err(|e| anyhow!("Invalid configuration: {}", e))
    }
}

/// Deep-merge `patch` into `target`; objects merge per key, everything else replaces
fn merge_json(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                merge_json(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tier: Tier::default(),
            source_language: default_source_language(),
            target_language: default_target_language(),
            translation: TranslationConfig::default(),
            backend: BackendConfig::default(),
            queue: QueueConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl TranslationConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        let provider_str = self.provider.to_lowercase_string();
        self.available_providers.iter()
            .find(|p| p.provider_type == provider_str)
    }

    /// Get the model for the active provider
    pub fn get_model(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.model.is_empty() {
                return provider_config.model.clone();
            }
        }

        match self.provider {
            TranslationProvider::OpenAI => default_openai_model(),
            TranslationProvider::Anthropic => default_anthropic_model(),
        }
    }

    /// Get the API key for the active provider
    pub fn get_api_key(&self) -> String {
        self.get_active_provider_config()
            .map(|p| p.api_key.trim().to_string())
            .unwrap_or_default()
    }

    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        if let Some(provider_config) = self.get_active_provider_config() {
            if !provider_config.endpoint.is_empty() {
                return provider_config.endpoint.clone();
            }
        }

        match self.provider {
            TranslationProvider::OpenAI => default_openai_endpoint(),
            TranslationProvider::Anthropic => default_anthropic_endpoint(),
        }
    }

    /// Get the request timeout for the active provider
    pub fn get_timeout_secs(&self) -> u64 {
        self.get_active_provider_config()
            .map(|p| p.timeout_secs)
            .filter(|t| *t > 0)
            .unwrap_or_else(default_provider_timeout_secs)
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::default(),
            available_providers: default_available_providers(),
            common: TranslationCommonConfig::default(),
        }
    }
}
