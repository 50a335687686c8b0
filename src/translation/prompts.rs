/*!
 * Prompt construction and response parsing for batch translation.
 *
 * Every request is a numbered list, one line per unit, with optional
 * unnumbered context from the neighbouring units. Responses are expected
 * in the same numbered form; parsing is lenient about the numbering style
 * and always returns exactly one line per requested unit.
 */

use once_cell::sync::Lazy;
use regex::Regex;

use crate::language_utils::display_name;
use crate::providers::ChatRequest;

static NUMBER_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+)\s*[.):\-]\s*").expect("number prefix regex is valid")
});

/// System prompt templates
pub struct PromptTemplate;

impl PromptTemplate {
    pub const TRANSLATOR: &'static str = "You are a professional subtitle translator. \
Translate each numbered line from {source_language} to {target_language}. \
Keep the meaning, tone and register of spoken dialogue and keep lines short enough to read on screen. \
Reply with the translated lines only, one per line, each prefixed with its original number. \
Never merge, split, skip or reorder lines.";

    pub const STRICT_TRANSLATOR: &'static str = "You are a professional subtitle translator. \
A previous attempt returned the lines untranslated. Every line MUST be written in {target_language}. \
Do not copy the {source_language} text back, even when a line looks like a name or a short phrase; \
translate it or transliterate it. Reply with the translated lines only, one per line, \
each prefixed with its original number.";

    pub const REFINER: &'static str = "You are a subtitle editor for {target_language}. \
The numbered lines are a machine translation. Rewrite each line so it reads naturally and fluently \
in {target_language} without changing its meaning. Reply with the rewritten lines only, \
one per line, each prefixed with its original number. Never merge, split, skip or reorder lines.";

    pub fn render(template: &str, source_language: &str, target_language: &str) -> String {
        template
            .replace("{source_language}", &display_name(source_language))
            .replace("{target_language}", &display_name(target_language))
    }
}

/// Builder for one batch request
#[derive(Debug, Clone)]
pub struct TranslationPromptBuilder {
    source_language: String,
    target_language: String,
    lines: Vec<String>,
    context_before: Option<String>,
    context_after: Option<String>,
    strict: bool,
    temperature: f32,
}

impl TranslationPromptBuilder {
    pub fn new(source_language: &str, target_language: &str) -> Self {
        Self {
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            lines: Vec::new(),
            context_before: None,
            context_after: None,
            strict: false,
            temperature: 0.3,
        }
    }

    /// Set the lines to translate
    pub fn with_lines<S: AsRef<str>>(mut self, lines: &[S]) -> Self {
        self.lines = lines.iter().map(|l| single_line(l.as_ref())).collect();
        self
    }

    /// Tail of the unit preceding the batch, at most `max_chars` characters
    pub fn with_context_before(mut self, text: Option<&str>, max_chars: usize) -> Self {
        self.context_before = text
            .map(|t| tail_chars(&single_line(t), max_chars))
            .filter(|t| !t.is_empty());
        self
    }

    /// Head of the unit following the batch, at most `max_chars` characters
    pub fn with_context_after(mut self, text: Option<&str>, max_chars: usize) -> Self {
        self.context_after = text
            .map(|t| head_chars(&single_line(t), max_chars))
            .filter(|t| !t.is_empty());
        self
    }

    /// Use the escalated instructions reserved for retries
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn build(&self) -> ChatRequest {
        let template = if self.strict {
            PromptTemplate::STRICT_TRANSLATOR
        } else {
            PromptTemplate::TRANSLATOR
        };
        let system = PromptTemplate::render(template, &self.source_language, &self.target_language);

        let mut user = format!(
            "Translate these {} subtitle lines into {}. Return exactly {} numbered lines.\n",
            self.lines.len(),
            display_name(&self.target_language),
            self.lines.len()
        );
        if let Some(before) = &self.context_before {
            user.push_str(&format!("[Context before, do not translate: {}]\n", before));
        }
        if let Some(after) = &self.context_after {
            user.push_str(&format!("[Context after, do not translate: {}]\n", after));
        }
        user.push('\n');
        user.push_str(&numbered(&self.lines));

        ChatRequest::new(system, user).temperature(self.temperature)
    }
}

/// Request rewriting already translated lines for fluency
pub fn build_refinement_request<S: AsRef<str>>(
    target_language: &str,
    lines: &[S],
    temperature: f32,
) -> ChatRequest {
    let lines: Vec<String> = lines.iter().map(|l| single_line(l.as_ref())).collect();
    let system = PromptTemplate::render(PromptTemplate::REFINER, target_language, target_language);
    let user = format!(
        "Improve these {} subtitle lines. Return exactly {} numbered lines.\n\n{}",
        lines.len(),
        lines.len(),
        numbered(&lines)
    );
    ChatRequest::new(system, user).temperature(temperature)
}

/// Parse a numbered response into exactly `expected` lines
///
/// Numbering tokens such as `3.`, `3)`, `3:` and `3-` are stripped. When the
/// response is numbered, lines are placed by their number and anything
/// unnumbered is ignored; otherwise lines are taken in order. Missing lines
/// come back empty and surplus lines are dropped.
pub fn parse_numbered_response(response: &str, expected: usize) -> Vec<String> {
    let lines: Vec<(Option<usize>, String)> = response
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("```"))
        .map(|line| match NUMBER_PREFIX.captures(line) {
            Some(caps) => {
                let number = caps[1].parse::<usize>().ok();
                (number, line[caps[0].len()..].trim().to_string())
            }
            None => (None, line.to_string()),
        })
        .collect();

    let mut result = vec![String::new(); expected];

    if lines.iter().any(|(number, _)| number.is_some()) {
        for (number, text) in lines {
            if let Some(n) = number {
                if (1..=expected).contains(&n) && result[n - 1].is_empty() {
                    result[n - 1] = text;
                }
            }
        }
    } else {
        for (slot, (_, text)) in result.iter_mut().zip(lines) {
            *slot = text;
        }
    }

    result
}

fn numbered(lines: &[String]) -> String {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{}. {}", i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn head_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn tail_chars(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max_chars)).collect()
}
