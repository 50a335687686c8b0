/*!
 * Core translation service implementation.
 *
 * `TranslationService` is the direct translator: it checks whether the
 * text already is in the target language, merges fragments into
 * sentences, sends sequential batches through the `BatchTranslator`,
 * optionally runs a refinement pass and restores the original timing.
 */

use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::{TranslationCommonConfig, TranslationConfig};
use crate::errors::{ProviderError, TranslationError};
use crate::language_utils::{detect_language, language_codes_match};
use crate::progress::{ProgressCallback, ProgressEvent};
use crate::providers::{self, Provider};
use crate::subtitle_processor::{Subtitle, TranslatedSubtitle};

use super::batch::{BatchContext, BatchTranslator};
use super::sentences::{self, SentenceMapping};

/// Number of leading subtitles sampled for the language pre-check
const LANGUAGE_SAMPLE_SIZE: usize = 5;

/// Translation service for subtitle translation
#[derive(Clone)]
pub struct TranslationService {
    /// Batch executor with the retry policy
    batches: BatchTranslator,

    /// Tunables
    pub options: TranslationCommonConfig,
}

impl TranslationService {
    /// Create a new translation service over an existing provider
    pub fn new(provider: Arc<dyn Provider>, options: TranslationCommonConfig) -> Self {
        Self {
            batches: BatchTranslator::new(provider, options.clone()),
            options,
        }
    }

    /// Create a translation service for the configured provider
    pub fn from_config(config: &TranslationConfig) -> Result<Self, TranslationError> {
        let provider = providers::from_config(config)?;
        Ok(Self::new(provider, config.common.clone()))
    }

    /// Translate subtitles from `source_language` to `target_language`
    ///
    /// The result has exactly one entry per input subtitle, with the input's
    /// timing. Lines that could not be translated carry their source text
    /// and `translation_failed`. Fails only on configuration problems or
    /// when no batch could be sent at all.
    pub async fn translate(
        &self,
        subtitles: &[Subtitle],
        source_language: &str,
        target_language: &str,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Result<Vec<TranslatedSubtitle>, TranslationError> {
        let report = |event: ProgressEvent| {
            if let Some(callback) = on_progress {
                callback(event);
            }
        };

        if subtitles.is_empty() {
            return Ok(Vec::new());
        }

        if self.already_in_language(subtitles, target_language) {
            info!("Subtitles already appear to be in {}, skipping translation", target_language);
            report(ProgressEvent::new("complete", "Already in the target language").with_percent(100.0));
            return Ok(subtitles.iter().map(TranslatedSubtitle::skipped).collect());
        }

        let (units, mapping) = if self.options.sentence_merge {
            sentences::merge(subtitles)
        } else {
            (subtitles.to_vec(), identity_mapping(subtitles.len()))
        };
        debug!("Translating {} subtitles as {} units", subtitles.len(), units.len());

        let mut translated = self
            .translate_units(&units, source_language, target_language, &report)
            .await?;

        if self.options.multi_pass {
            report(ProgressEvent::new("refining", "Refining translation"));
            translated = self.refine(translated, target_language).await;
        }

        let result = if units.len() == subtitles.len() {
            translated
                .into_iter()
                .zip(subtitles)
                .map(|(unit, original)| TranslatedSubtitle { text: original.text.clone(), ..unit })
                .collect()
        } else {
            sentences::resplit(subtitles, &translated, &mapping)
        };

        report(ProgressEvent::new("complete", "Translation complete").with_percent(100.0));
        Ok(result)
    }

    fn already_in_language(&self, subtitles: &[Subtitle], target_language: &str) -> bool {
        let sample = subtitles
            .iter()
            .take(LANGUAGE_SAMPLE_SIZE)
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        detect_language(&sample)
            .is_some_and(|detected| language_codes_match(detected, target_language))
    }

    async fn translate_units(
        &self,
        units: &[Subtitle],
        source_language: &str,
        target_language: &str,
        report: &(dyn Fn(ProgressEvent) + Send + Sync),
    ) -> Result<Vec<TranslatedSubtitle>, TranslationError> {
        let batch_size = self.options.batch_size.max(1);
        let total = units.len().div_ceil(batch_size);
        let mut result = Vec::with_capacity(units.len());
        let mut failed_batches = 0usize;
        let mut last_error: Option<ProviderError> = None;

        for (index, chunk) in units.chunks(batch_size).enumerate() {
            let start = index * batch_size;
            let end = start + chunk.len();

            report(
                ProgressEvent::new("translating", format!("Translating batch {}/{}", index + 1, total))
                    .with_percent(index as f64 / total as f64 * 100.0)
                    .with_batch(index + 1, total),
            );

            let lines: Vec<String> = chunk.iter().map(|u| u.text.clone()).collect();
            let context = BatchContext {
                before: start.checked_sub(1).map(|i| units[i].text.as_str()),
                after: units.get(end).map(|u| u.text.as_str()),
            };

            match self
                .batches
                .translate_batch(&lines, context, source_language, target_language)
                .await
            {
                Ok(outputs) => {
                    let failed = outputs.iter().filter(|o| o.is_none()).count();
                    if failed > 0 {
                        warn!("Batch {}/{}: {} of {} lines fell back to source text", index + 1, total, failed, chunk.len());
                    }
                    result.extend(chunk.iter().zip(outputs).map(|(unit, output)| match output {
                        Some(text) => TranslatedSubtitle::from_source(unit, text),
                        None => TranslatedSubtitle::failed(unit),
                    }));
                }
                Err(e @ ProviderError::AuthenticationError(_)) => {
                    return Err(TranslationError::Configuration(e.to_string()));
                }
                Err(e) => {
                    warn!("Batch {}/{} failed after retries: {}", index + 1, total, e);
                    failed_batches += 1;
                    result.extend(chunk.iter().map(TranslatedSubtitle::failed));
                    last_error = Some(e);
                }
            }

            if index + 1 < total && self.options.rate_limit_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.options.rate_limit_delay_ms)).await;
            }
        }

        if failed_batches == total {
            return Err(TranslationError::AllBatchesFailed {
                batches: total,
                last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
            });
        }

        Ok(result)
    }

    /// Second pass over already translated units
    ///
    /// Only the translated text is sent; failed and skipped items are left
    /// alone and a failing batch keeps the first pass result.
    pub async fn refine(
        &self,
        mut items: Vec<TranslatedSubtitle>,
        target_language: &str,
    ) -> Vec<TranslatedSubtitle> {
        let candidates: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| !item.translation_failed && !item.skipped_translation)
            .map(|(i, _)| i)
            .collect();

        let batch_size = self.options.batch_size.max(1);
        let total = candidates.len().div_ceil(batch_size);

        for (index, chunk) in candidates.chunks(batch_size).enumerate() {
            let lines: Vec<String> = chunk.iter().map(|&i| items[i].translated_text.clone()).collect();
            let refined = self.batches.refine_batch(&lines, target_language).await;

            for (&item_index, text) in chunk.iter().zip(refined) {
                if let Some(text) = text {
                    items[item_index].translated_text = text;
                    items[item_index].refined = true;
                }
            }

            if index + 1 < total && self.options.rate_limit_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.options.rate_limit_delay_ms)).await;
            }
        }

        items
    }
}

fn identity_mapping(len: usize) -> SentenceMapping {
    (0..len).map(|i| vec![i]).collect()
}
