/*!
 * Direct translation of subtitles through a chat-completion provider.
 *
 * - `core`: the `TranslationService` pipeline
 * - `batch`: one batch request with its retry policy
 * - `sentences`: merging fragments into sentences and splitting back
 * - `prompts`: prompt builders and response parsing
 * - `cache`: bounded LRU cache of finished translations
 */

pub use self::batch::BatchTranslator;
pub use self::cache::{CacheStats, TranslationCache};
pub use self::core::TranslationService;
pub use self::prompts::{PromptTemplate, TranslationPromptBuilder};

pub mod batch;
pub mod cache;
pub mod core;
pub mod prompts;
pub mod sentences;
