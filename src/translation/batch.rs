/*!
 * Batch translation processing.
 *
 * This module sends one batch of units to the provider and applies the
 * retry policy:
 * - transport failures are retried with exponential backoff
 * - a batch that comes back mostly unchanged is retried once with the
 *   escalated prompt
 * - both share the same retry budget
 * - authentication failures are never retried
 */

use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::TranslationCommonConfig;
use crate::errors::ProviderError;
use crate::providers::{ChatRequest, Provider};

use super::prompts::{build_refinement_request, parse_numbered_response, TranslationPromptBuilder};

/// Neighbouring text handed to the model but not translated
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchContext<'a> {
    pub before: Option<&'a str>,
    pub after: Option<&'a str>,
}

/// Batch translator for sending numbered batches to a provider
#[derive(Clone)]
pub struct BatchTranslator {
    /// The provider to call
    provider: Arc<dyn Provider>,

    /// Batch tunables
    options: TranslationCommonConfig,
}

impl BatchTranslator {
    pub fn new(provider: Arc<dyn Provider>, options: TranslationCommonConfig) -> Self {
        Self { provider, options }
    }

    /// Translate one batch
    ///
    /// Returns one entry per input line: `Some(translation)` or `None` when
    /// the line could not be translated and should fall back to its source.
    /// An error means the provider could not be reached within the budget.
    pub async fn translate_batch(
        &self,
        lines: &[String],
        context: BatchContext<'_>,
        source_language: &str,
        target_language: &str,
    ) -> Result<Vec<Option<String>>, ProviderError> {
        if lines.is_empty() {
            return Ok(Vec::new());
        }

        let mut retries_left = self.options.retry_count;
        let mut transport_attempts = 0u32;
        let mut strict = false;

        loop {
            let request = TranslationPromptBuilder::new(source_language, target_language)
                .with_lines(lines)
                .with_context_before(context.before, self.options.context_chars)
                .with_context_after(context.after, self.options.context_chars)
                .strict(strict)
                .temperature(self.options.temperature)
                .build();

            match self.provider.complete(request).await {
                Ok(response) => {
                    let outputs = parse_numbered_response(&response, lines.len());
                    let ratio = unchanged_ratio(lines, &outputs);
                    let stale = ratio > self.options.stale_threshold;

                    if stale {
                        if !strict && retries_left > 0 {
                            warn!(
                                "{:.0}% of a {}-line batch came back untranslated, retrying with escalated prompt",
                                ratio * 100.0,
                                lines.len()
                            );
                            retries_left -= 1;
                            strict = true;
                            continue;
                        }
                        warn!(
                            "Batch still {:.0}% untranslated, falling back to source text for unchanged lines",
                            ratio * 100.0
                        );
                    }

                    return Ok(accept_outputs(lines, outputs, stale));
                }
                Err(e @ ProviderError::AuthenticationError(_)) => return Err(e),
                Err(e) if retries_left > 0 && e.is_retryable() => {
                    retries_left -= 1;
                    transport_attempts += 1;
                    let backoff_ms = backoff_delay_ms(self.options.retry_backoff_ms, transport_attempts);
                    warn!(
                        "{} request failed ({}), retrying in {}ms",
                        self.provider.name(),
                        e,
                        backoff_ms
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Rewrite already translated lines for fluency
    ///
    /// Failures are reported as `None` per line so callers keep the first
    /// pass result.
    pub async fn refine_batch(&self, lines: &[String], target_language: &str) -> Vec<Option<String>> {
        if lines.is_empty() {
            return Vec::new();
        }

        let request: ChatRequest =
            build_refinement_request(target_language, lines, self.options.temperature);

        match self.provider.complete(request).await {
            Ok(response) => parse_numbered_response(&response, lines.len())
                .into_iter()
                .map(|line| (!line.is_empty()).then_some(line))
                .collect(),
            Err(e) => {
                warn!("Refinement batch failed, keeping first pass: {}", e);
                vec![None; lines.len()]
            }
        }
    }
}

/// Share of translatable lines whose output is empty or equal to the input
///
/// Comparison ignores case and surrounding whitespace. Lines without any
/// letters (music notes, numbers) are left out of the ratio.
pub fn unchanged_ratio(inputs: &[String], outputs: &[String]) -> f64 {
    let mut considered = 0usize;
    let mut unchanged = 0usize;

    for (input, output) in inputs.iter().zip(outputs) {
        if !input.chars().any(char::is_alphabetic) {
            continue;
        }
        considered += 1;
        if is_unchanged(input, output) {
            unchanged += 1;
        }
    }

    if considered == 0 {
        0.0
    } else {
        unchanged as f64 / considered as f64
    }
}

fn is_unchanged(input: &str, output: &str) -> bool {
    let output = output.trim();
    output.is_empty() || output.to_lowercase() == input.trim().to_lowercase()
}

/// Delay before transport retry `attempt` (1-based), doubling each time
pub fn backoff_delay_ms(base_ms: u64, attempt: u32) -> u64 {
    let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor)
}

/// Turn parsed outputs into per-line results
///
/// Empty lines always fail. Unchanged lines only fail when the batch as a
/// whole stayed untranslated; in an accepted batch they are kept, since
/// names and short replies often read the same in both languages.
fn accept_outputs(inputs: &[String], outputs: Vec<String>, stale: bool) -> Vec<Option<String>> {
    inputs
        .iter()
        .zip(outputs)
        .map(|(input, output)| {
            let letters = input.chars().any(char::is_alphabetic);
            if output.trim().is_empty() {
                debug!("Empty translation for line '{}'", input);
                None
            } else if stale && letters && is_unchanged(input, &output) {
                None
            } else {
                Some(output)
            }
        })
        .collect()
}
