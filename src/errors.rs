/*!
 * Error types for the subflux library.
 *
 * This module contains custom error types for the different subsystems,
 * using the thiserror crate for ergonomic error definitions. Persistence
 * code works with `anyhow` and is folded into `AppError::Store` at the
 * action boundary.
 */

use thiserror::Error;

/// Errors that can occur when talking to a chat-completion provider
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

impl ProviderError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AuthenticationError(_) => false,
            Self::ApiError { status_code, .. } => *status_code >= 500 || *status_code == 408,
            _ => true,
        }
    }
}

/// Errors produced by the remote processing service client
#[derive(Error, Debug)]
pub enum BackendError {
    /// Missing or invalid backend configuration
    #[error("Backend configuration error: {0}")]
    Configuration(String),

    /// Network failure before a response was received
    #[error("Backend request failed: {0}")]
    Transport(String),

    /// Non-2xx HTTP status
    #[error("Backend responded with {status_code}: {message}")]
    Http {
        /// HTTP status code
        status_code: u16,
        /// Response body or reason
        message: String,
    },

    /// Unexpected response shape
    #[error("Unexpected backend response: {0}")]
    Protocol(String),

    /// The remote service reported a failure; surfaced verbatim
    #[error("{0}")]
    Remote(String),

    /// The overall deadline elapsed
    #[error("Backend operation timed out after {0} seconds")]
    Timeout(u64),

    /// The operation was cancelled by its owner
    #[error("Backend operation cancelled")]
    Cancelled,
}

/// Errors that can occur during direct translation
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Missing credential or model for the configured provider
    #[error("Translation configuration error: {0}")]
    Configuration(String),

    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Every batch failed at the transport level, nothing was translated
    #[error("All {batches} translation batches failed: {last_error}")]
    AllBatchesFailed {
        /// Number of batches attempted
        batches: usize,
        /// Message of the last failure
        last_error: String,
    },
}

/// Errors raised by the persistent queue
#[derive(Error, Debug, PartialEq)]
pub enum QueueError {
    /// Same video and target language already waiting or running
    #[error("Video {video_id} is already queued for {target_language}")]
    Duplicate {
        /// Video identifier
        video_id: String,
        /// Target language code
        target_language: String,
    },

    /// No item with that id
    #[error("Queue item not found: {0}")]
    NotFound(String),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from the remote processing service
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Error from the queue
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Persistent store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Subtitles could not be obtained for a video
    #[error("Subtitle error: {0}")]
    Subtitle(String),

    /// The action name is not part of the interface
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// Malformed action payload
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Store(format!("{:#}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidRequest(error.to_string())
    }
}
