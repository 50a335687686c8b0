/*!
 * Sentence merging and re-splitting.
 *
 * Caption sources often cut one sentence across several timed fragments.
 * Translating fragments in isolation gives poor results, so adjacent
 * fragments are merged into whole sentences before translation and the
 * translated sentence is spread back over the original timing slots
 * afterwards.
 *
 * The re-split is a word-count heuristic: timing is preserved exactly,
 * the distribution of words over the fragments is not guaranteed to be
 * meaningful.
 */

use crate::subtitle_processor::{Subtitle, TranslatedSubtitle};

/// Original indices that make up each merged unit, in order
pub type SentenceMapping = Vec<Vec<usize>>;

const SENTENCE_TERMINATORS: [char; 7] = ['.', '!', '?', '。', '！', '？', '…'];

/// Whether a fragment closes a sentence
pub fn ends_sentence(text: &str) -> bool {
    text.trim_end()
        .chars()
        .last()
        .is_some_and(|c| SENTENCE_TERMINATORS.contains(&c))
}

/// Merge consecutive fragments into sentence units
///
/// A group is flushed when a fragment ends with terminal punctuation or at
/// the last fragment. Each merged unit spans from the first member's start
/// to the last member's end.
pub fn merge(subtitles: &[Subtitle]) -> (Vec<Subtitle>, SentenceMapping) {
    let mut merged = Vec::new();
    let mut mapping: SentenceMapping = Vec::new();
    let mut group: Vec<usize> = Vec::new();

    for (index, subtitle) in subtitles.iter().enumerate() {
        group.push(index);
        let is_last = index + 1 == subtitles.len();

        if ends_sentence(&subtitle.text) || is_last {
            merged.push(merge_group(subtitles, &group));
            mapping.push(std::mem::take(&mut group));
        }
    }

    (merged, mapping)
}

fn merge_group(subtitles: &[Subtitle], group: &[usize]) -> Subtitle {
    let first = &subtitles[group[0]];
    let last = &subtitles[group[group.len() - 1]];
    let text = group
        .iter()
        .map(|&i| subtitles[i].text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    Subtitle::new(first.start, last.end, text)
}

/// Spread translated units back over the original subtitles
///
/// Single-member groups take the translation as is. Larger groups split the
/// translation into words and hand out `ceil(words / members)` words per
/// member; a member whose slice comes out empty gets the full translation.
/// Units flagged as failed or skipped fall back per member to the original
/// text with the same flag.
pub fn resplit(
    originals: &[Subtitle],
    translated: &[TranslatedSubtitle],
    mapping: &SentenceMapping,
) -> Vec<TranslatedSubtitle> {
    let mut result = Vec::with_capacity(originals.len());

    for (unit_index, group) in mapping.iter().enumerate() {
        let Some(unit) = translated.get(unit_index) else {
            result.extend(group.iter().map(|&i| TranslatedSubtitle::failed(&originals[i])));
            continue;
        };

        if unit.translation_failed {
            result.extend(group.iter().map(|&i| TranslatedSubtitle::failed(&originals[i])));
            continue;
        }
        if unit.skipped_translation {
            result.extend(group.iter().map(|&i| TranslatedSubtitle::skipped(&originals[i])));
            continue;
        }

        if group.len() == 1 {
            let mut item = TranslatedSubtitle::from_source(&originals[group[0]], unit.translated_text.clone());
            item.refined = unit.refined;
            result.push(item);
            continue;
        }

        let words: Vec<&str> = unit.translated_text.split_whitespace().collect();
        let per_member = words.len().div_ceil(group.len());

        for (position, &original_index) in group.iter().enumerate() {
            let from = (position * per_member).min(words.len());
            let to = ((position + 1) * per_member).min(words.len());
            let slice = words[from..to].join(" ");
            let text = if slice.is_empty() {
                unit.translated_text.clone()
            } else {
                slice
            };

            let mut item = TranslatedSubtitle::from_source(&originals[original_index], text);
            item.refined = unit.refined;
            result.push(item);
        }
    }

    result
}
