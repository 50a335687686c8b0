/*!
 * Provider implementations for chat-completion services.
 *
 * This module contains client implementations used by the direct translator:
 * - OpenAI: OpenAI-compatible chat completions (OpenAI, OpenRouter, LM Studio)
 * - Anthropic: Anthropic messages API
 * - Mock: scripted provider for tests
 */

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

use crate::app_config::{TranslationConfig, TranslationProvider};
use crate::errors::{ProviderError, TranslationError};

/// A provider-neutral single-turn chat request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// System prompt
    pub system: String,
    /// User message
    pub user: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.3,
            max_tokens: 4096,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Common trait for all chat-completion providers
///
/// Implementations make exactly one HTTP request per call; retry policy
/// belongs to the caller.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// Complete a request and return the generated text
    async fn complete(&self, request: ChatRequest) -> Result<String, ProviderError>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

/// Map an HTTP failure status to the provider error taxonomy
pub(crate) fn error_for_status(status_code: u16, message: String) -> ProviderError {
    match status_code {
        401 | 403 => ProviderError::AuthenticationError(message),
        429 => ProviderError::RateLimitExceeded(message),
        _ => ProviderError::ApiError { status_code, message },
    }
}

/// Build the configured provider client
pub fn from_config(config: &TranslationConfig) -> Result<Arc<dyn Provider>, TranslationError> {
    let api_key = config.get_api_key();
    if api_key.is_empty() {
        return Err(TranslationError::Configuration(format!(
            "Translation API key is required for {} provider",
            config.provider.display_name()
        )));
    }
    let model = config.get_model();
    let timeout_secs = config.get_timeout_secs();

    let provider: Arc<dyn Provider> = match config.provider {
        TranslationProvider::OpenAI => Arc::new(openai::OpenAI::new(
            api_key,
            config.get_endpoint(),
            model,
            timeout_secs,
        )),
        TranslationProvider::Anthropic => Arc::new(anthropic::Anthropic::new(
            api_key,
            config.get_endpoint(),
            model,
            timeout_secs,
        )),
    };
    Ok(provider)
}

pub mod openai;
pub mod anthropic;
pub mod mock;
