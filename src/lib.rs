/*!
 * # subflux - subtitle translation orchestration
 *
 * A Rust library that produces translated, timed subtitles for videos,
 * either through a remote processing service or by calling a
 * chat-completion API directly.
 *
 * ## Features
 *
 * - Three tiers: local (direct translation), server and streaming
 *   (remote processing service)
 * - Remote protocols: asynchronous jobs with polling, synchronous JSON
 *   and Server-Sent Events with partial results
 * - Sentence merging before translation and proportional resplitting after
 * - Batched translation with context, stale-output retry and refinement
 * - Persistent LRU cache of finished translations
 * - Persistent translation queue with a single background worker
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `app_controller`: Action interface dispatching to the core
 * - `backend`: Remote processing service client:
 *   - `backend::sse`: Incremental Server-Sent Events parsing
 *   - `backend::client`: Protocol detection and the three wire protocols
 * - `database`: SQLite-backed key-value persistence
 * - `pipeline`: Cache, backend and translator for whole videos
 * - `queue`: Persistent queue and its worker
 * - `translation`: Direct translation:
 *   - `translation::sentences`: Sentence merging and resplitting
 *   - `translation::batch`: Batch requests with retries
 *   - `translation::cache`: LRU translation cache
 * - `providers`: Chat-completion clients (OpenAI-compatible, Anthropic)
 * - `live_view`: Progress and partial results for observers
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod backend;
pub mod database;
pub mod errors;
pub mod language_utils;
pub mod live_view;
pub mod pipeline;
pub mod progress;
pub mod providers;
pub mod queue;
pub mod subtitle_processor;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::{Config, Tier};
pub use app_controller::{Controller, Request, Response};
pub use backend::{BackendClient, BackendProtocol, HttpTransport, ProcessMode, Transport};
pub use database::{KeyValueStore, MemoryStore, SqliteStore};
pub use errors::{AppError, BackendError, ProviderError, QueueError, TranslationError};
pub use live_view::{ChannelView, LiveView, NullView, ViewMessage};
pub use pipeline::{ConfiguredProviders, ProviderFactory, VideoPipeline};
pub use queue::{QueueItem, QueueManager, QueueStatus};
pub use subtitle_processor::{Subtitle, SubtitleSource, TranslatedSubtitle};
pub use translation::{TranslationCache, TranslationService};
