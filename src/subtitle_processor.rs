use std::fmt;
use std::path::{Path, PathBuf};
use regex::Regex;
use once_cell::sync::Lazy;
use anyhow::{Result, Context, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use log::{debug, warn};

// @module: Subtitle model, SRT handling and subtitle sources

// @const: SRT timestamp regex
static TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{2}):(\d{2}):(\d{2})[,.](\d{3}) --> (\d{2}):(\d{2}):(\d{2})[,.](\d{3})")
        .expect("timestamp regex is valid")
});

/// A single timed line of text as produced by the caption or transcription source.
///
/// Times are in seconds. The core never rewrites `start`, `end` or `text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtitle {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Subtitle {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self { start, end, text: text.into() }
    }

    /// Format a time in seconds as an SRT timestamp (HH:MM:SS,mmm)
    pub fn format_timestamp(seconds: f64) -> String {
        let ms = (seconds.max(0.0) * 1000.0).round() as u64;
        let hours = ms / 3_600_000;
        let minutes = (ms % 3_600_000) / 60_000;
        let secs = (ms % 60_000) / 1_000;
        let millis = ms % 1_000;

        format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A subtitle with its translation attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslatedSubtitle {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub text: String,
    #[serde(default, alias = "translated_text", alias = "translation")]
    pub translated_text: String,
    /// Translation gave up and `translated_text` holds the source text
    #[serde(default, skip_serializing_if = "is_false")]
    pub translation_failed: bool,
    /// Source was already in the target language
    #[serde(default, skip_serializing_if = "is_false")]
    pub skipped_translation: bool,
    /// Rewritten by the refinement pass
    #[serde(default, skip_serializing_if = "is_false")]
    pub refined: bool,
}

impl TranslatedSubtitle {
    /// Attach a translation to a source subtitle
    pub fn from_source(source: &Subtitle, translated_text: impl Into<String>) -> Self {
        Self {
            start: source.start,
            end: source.end,
            text: source.text.clone(),
            translated_text: translated_text.into(),
            translation_failed: false,
            skipped_translation: false,
            refined: false,
        }
    }

    /// Fallback entry carrying the source text, flagged as failed
    pub fn failed(source: &Subtitle) -> Self {
        Self {
            translation_failed: true,
            ..Self::from_source(source, source.text.clone())
        }
    }

    /// Entry for text that already is in the target language
    pub fn skipped(source: &Subtitle) -> Self {
        Self {
            skipped_translation: true,
            ..Self::from_source(source, source.text.clone())
        }
    }
}

impl fmt::Display for TranslatedSubtitle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} --> {}\n{}",
            Subtitle::format_timestamp(self.start),
            Subtitle::format_timestamp(self.end),
            self.translated_text
        )
    }
}

/// Render translated subtitles as an SRT document
pub fn to_srt(subtitles: &[TranslatedSubtitle]) -> String {
    let mut out = String::new();
    for (i, subtitle) in subtitles.iter().enumerate() {
        out.push_str(&format!("{}\n{}\n\n", i + 1, subtitle));
    }
    out
}

/// Parse SRT format string into subtitles (times in seconds)
pub fn parse_srt_string(content: &str) -> Result<Vec<Subtitle>> {
    let mut entries: Vec<Subtitle> = Vec::new();

    let mut have_seq = false;
    let mut current_times: Option<(f64, f64)> = None;
    let mut current_text = String::new();

    for (line_no, line) in content.lines().enumerate() {
        let trimmed = line.trim().trim_start_matches('\u{feff}');

        if trimmed.is_empty() {
            if let Some((start, end)) = current_times {
                if !current_text.is_empty() {
                    entries.push(Subtitle::new(start, end, current_text.clone()));
                }
            }
            have_seq = false;
            current_times = None;
            current_text.clear();
            continue;
        }

        if !have_seq && current_times.is_none() && trimmed.parse::<usize>().is_ok() {
            have_seq = true;
            continue;
        }

        if current_times.is_none() {
            if let Some(caps) = TIMESTAMP_REGEX.captures(trimmed) {
                current_times = Some((parse_timestamp(&caps, 1), parse_timestamp(&caps, 5)));
                continue;
            }
        }

        if current_times.is_some() {
            if !current_text.is_empty() {
                current_text.push('\n');
            }
            current_text.push_str(trimmed);
        } else {
            warn!("Unexpected text at line {} before timestamp: {}", line_no + 1, trimmed);
        }
    }

    if let Some((start, end)) = current_times {
        if !current_text.is_empty() {
            entries.push(Subtitle::new(start, end, current_text));
        }
    }

    if entries.is_empty() {
        return Err(anyhow!("No valid subtitle entries were found in the SRT content"));
    }

    entries.sort_by(|a, b| a.start.total_cmp(&b.start));
    Ok(entries)
}

fn parse_timestamp(caps: &regex::Captures, start_idx: usize) -> f64 {
    let field = |i: usize| -> u64 {
        caps.get(start_idx + i)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    let ms = (field(0) * 3600 + field(1) * 60 + field(2)) * 1000 + field(3);
    ms as f64 / 1000.0
}

/// Where raw (untranslated) subtitles for a video come from.
///
/// The caption track or transcription service lives outside this crate;
/// the local tier asks this seam for the source text before translating.
#[async_trait]
pub trait SubtitleSource: Send + Sync {
    async fn fetch(&self, video_id: &str) -> Result<Vec<Subtitle>>;
}

/// Reads `<dir>/<video_id>.srt` or `<dir>/<video_id>.json`
#[derive(Debug, Clone)]
pub struct FileSubtitleSource {
    dir: PathBuf,
}

impl FileSubtitleSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn candidate(&self, video_id: &str, extension: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", video_id, extension))
    }

    async fn read(path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read subtitles from {:?}", path))
    }
}

#[async_trait]
impl SubtitleSource for FileSubtitleSource {
    async fn fetch(&self, video_id: &str) -> Result<Vec<Subtitle>> {
        let srt = self.candidate(video_id, "srt");
        if tokio::fs::try_exists(&srt).await.unwrap_or(false) {
            debug!("Loading SRT subtitles for {} from {:?}", video_id, srt);
            return parse_srt_string(&Self::read(&srt).await?);
        }

        let json = self.candidate(video_id, "json");
        if tokio::fs::try_exists(&json).await.unwrap_or(false) {
            debug!("Loading JSON subtitles for {} from {:?}", video_id, json);
            let content = Self::read(&json).await?;
            return serde_json::from_str(&content)
                .with_context(|| format!("Invalid subtitle JSON in {:?}", json));
        }

        Err(anyhow!("No subtitles found for video {} in {:?}", video_id, self.dir))
    }
}
