use anyhow::{Result, anyhow};
use isolang::Language;

/// Language utilities for ISO language code handling and script detection
///
/// This module provides functions for normalizing and matching ISO 639-1
/// (2-letter) and ISO 639-2 (3-letter) language codes, plus a cheap
/// Unicode-block heuristic that guesses the language of a text sample.

/// Map an ISO 639-2/B code to its 639-2/T form, if it differs
fn bibliographic_to_terminology(code: &str) -> Option<&'static str> {
    let mapped = match code {
        "fre" => "fra",
        "ger" => "deu",
        "dut" => "nld",
        "gre" => "ell",
        "chi" => "zho",
        "cze" => "ces",
        "ice" => "isl",
        "alb" => "sqi",
        "arm" => "hye",
        "baq" => "eus",
        "bur" => "mya",
        "per" => "fas",
        "geo" => "kat",
        "may" => "msa",
        "mac" => "mkd",
        "rum" => "ron",
        "slo" => "slk",
        "wel" => "cym",
        _ => return None,
    };
    Some(mapped)
}

/// Strip region/script subtags: "zh-CN" -> "zh", "pt_BR" -> "pt"
fn primary_subtag(code: &str) -> String {
    code.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Normalize a language code to ISO 639-2/T (3-letter) format
pub fn normalize_to_part2t(code: &str) -> Result<String> {
    let normalized_code = primary_subtag(code);

    if normalized_code.len() == 2 {
        if let Some(lang) = Language::from_639_1(&normalized_code) {
            return Ok(lang.to_639_3().to_string());
        }
    } else if normalized_code.len() == 3 {
        if Language::from_639_3(&normalized_code).is_some() {
            return Ok(normalized_code);
        }
        if let Some(part2t) = bibliographic_to_terminology(&normalized_code) {
            return Ok(part2t.to_string());
        }
    }

    Err(anyhow!("Cannot normalize invalid language code: {}", code))
}

/// Normalize a language code to ISO 639-1 (2-letter) format if possible
/// Falls back to ISO 639-2/T if no ISO 639-1 code exists
pub fn normalize_to_part1_or_part2t(code: &str) -> Result<String> {
    let part2t = normalize_to_part2t(code)?;
    let lang = Language::from_639_3(&part2t)
        .ok_or_else(|| anyhow!("Cannot normalize invalid language code: {}", code))?;

    Ok(lang.to_639_1().map(str::to_string).unwrap_or(part2t))
}

/// Normalize for comparisons; unknown codes fall back to their lowercase primary subtag
pub fn normalize_language(code: &str) -> String {
    normalize_to_part1_or_part2t(code).unwrap_or_else(|_| primary_subtag(code))
}

/// Check if two language codes match (represent the same language)
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    normalize_language(code1) == normalize_language(code2)
}

/// Get the language name from a code
pub fn get_language_name(code: &str) -> Result<String> {
    let normalized = normalize_to_part2t(code)?;
    let lang = Language::from_639_3(&normalized)
        .ok_or_else(|| anyhow!("Failed to get language from code: {}", normalized))?;

    Ok(lang.to_name().to_string())
}

/// Name to use inside prompts; unknown and "auto" codes degrade gracefully
pub fn display_name(code: &str) -> String {
    if code.trim().is_empty() || code.eq_ignore_ascii_case("auto") {
        return "the original language".to_string();
    }
    get_language_name(code).unwrap_or_else(|_| code.to_string())
}

/// Writing systems the detector can tell apart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Kana,
    Hangul,
    Han,
    Arabic,
    Devanagari,
    Cyrillic,
    Thai,
    Hebrew,
    Greek,
    Other,
}

fn script_of(c: char) -> Script {
    match c as u32 {
        0x3040..=0x30FF | 0x31F0..=0x31FF | 0xFF66..=0xFF9D => Script::Kana,
        0xAC00..=0xD7AF | 0x1100..=0x11FF | 0x3130..=0x318F => Script::Hangul,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF => Script::Han,
        0x0600..=0x06FF | 0x0750..=0x077F => Script::Arabic,
        0x0900..=0x097F => Script::Devanagari,
        0x0400..=0x04FF => Script::Cyrillic,
        0x0E00..=0x0E7F => Script::Thai,
        0x0590..=0x05FF => Script::Hebrew,
        0x0370..=0x03FF => Script::Greek,
        _ => Script::Other,
    }
}

/// Guess the language of `text` from the Unicode blocks it uses.
///
/// Only scripts that identify a language are recognised; Latin text yields
/// `None`. Any kana among Han characters means Japanese.
pub fn detect_language(text: &str) -> Option<&'static str> {
    let mut counts = [0usize; 10];
    let mut letters = 0usize;

    for c in text.chars().filter(|c| c.is_alphabetic()) {
        letters += 1;
        counts[script_of(c) as usize] += 1;
    }
    if letters == 0 {
        return None;
    }

    let count = |s: Script| counts[s as usize];
    let kana = count(Script::Kana);
    let han = count(Script::Han);

    let mut best = (Script::Other, 0usize);
    for script in [
        Script::Hangul,
        Script::Arabic,
        Script::Devanagari,
        Script::Cyrillic,
        Script::Thai,
        Script::Hebrew,
        Script::Greek,
    ] {
        if count(script) > best.1 {
            best = (script, count(script));
        }
    }
    if kana + han > best.1 {
        best = (if kana > 0 { Script::Kana } else { Script::Han }, kana + han);
    }

    // Needs to cover a real share of the sample, not a stray symbol
    if best.1 * 10 < letters * 3 {
        return None;
    }

    match best.0 {
        Script::Kana => Some("ja"),
        Script::Hangul => Some("ko"),
        Script::Han => Some("zh"),
        Script::Arabic => Some("ar"),
        Script::Devanagari => Some("hi"),
        Script::Cyrillic => Some("ru"),
        Script::Thai => Some("th"),
        Script::Hebrew => Some("he"),
        Script::Greek => Some("el"),
        Script::Other => None,
    }
}
