/*!
 * Client for the remote processing service.
 *
 * The wire protocol is chosen from the shape of the configured URL:
 * - `https://api.runpod.ai/v2/<endpoint>`: asynchronous job, submitted to
 *   `/run` and polled at `/status/<id>`
 * - `https://<endpoint>.api.runpod.ai`: load-balanced endpoint answering
 *   one JSON document
 * - anything else: a server streaming Server-Sent Events from `/process`
 *   or, for progressive results, `/stream`
 *
 * All three produce the same `Vec<TranslatedSubtitle>`.
 */

use futures::StreamExt;
use log::{debug, info, warn};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::app_config::BackendConfig;
use crate::errors::BackendError;
use crate::progress::{BatchInfo, PartialResultCallback, ProgressCallback, ProgressEvent};
use crate::subtitle_processor::TranslatedSubtitle;

use super::deadline::Deadline;
use super::sse::{SseEvent, SseParser};
use super::transport::Transport;

const JOB_HOST: &str = "api.runpod.ai";

/// Wire protocol spoken with the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendProtocol {
    /// Submit a job and poll its status; `base` is `.../v2/<endpoint>`
    Job { base: String },
    /// One POST answered by a JSON document
    SyncJson { base: String },
    /// One POST answered by an event stream
    EventStream { base: String },
}

impl BackendProtocol {
    /// Derive the protocol from the service URL
    pub fn detect(url: &str) -> Result<Self, BackendError> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(BackendError::Configuration("Backend URL is not configured".to_string()));
        }
        let parsed = Url::parse(trimmed)
            .map_err(|e| BackendError::Configuration(format!("Invalid backend URL '{}': {}", trimmed, e)))?;
        let host = parsed.host_str().unwrap_or_default().to_lowercase();
        let segments: Vec<&str> = parsed
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        if host == JOB_HOST && segments.len() >= 2 && segments[0] == "v2" {
            let base = format!("{}://{}/v2/{}", parsed.scheme(), host, segments[1]);
            return Ok(Self::Job { base });
        }

        let base = strip_endpoint_suffix(trimmed);
        if host.ends_with(&format!(".{}", JOB_HOST)) {
            Ok(Self::SyncJson { base })
        } else {
            Ok(Self::EventStream { base })
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Job { .. } => "job",
            Self::SyncJson { .. } => "sync-json",
            Self::EventStream { .. } => "sse",
        }
    }
}

fn strip_endpoint_suffix(url: &str) -> String {
    let base = url.trim_end_matches('/');
    base.strip_suffix("/process")
        .or_else(|| base.strip_suffix("/stream"))
        .unwrap_or(base)
        .to_string()
}

/// Single result or progressive partial results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessMode {
    Single,
    Streaming,
}

/// Coarse progress estimate for a job status
pub fn job_status_percent(status: &str) -> Option<f64> {
    match status {
        "IN_QUEUE" => Some(5.0),
        "IN_PROGRESS" => Some(50.0),
        "COMPLETED" => Some(100.0),
        _ => None,
    }
}

/// Client for the remote processing service
#[derive(Clone)]
pub struct BackendClient {
    transport: Arc<dyn Transport>,
    config: BackendConfig,
}

impl BackendClient {
    pub fn new(transport: Arc<dyn Transport>, config: BackendConfig) -> Self {
        Self { transport, config }
    }

    pub fn protocol(&self) -> Result<BackendProtocol, BackendError> {
        BackendProtocol::detect(&self.config.url)
    }

    /// Produce translated subtitles for a video
    pub async fn process(
        &self,
        video_id: &str,
        target_language: &str,
        mode: ProcessMode,
        on_progress: Option<ProgressCallback<'_>>,
        on_partial: Option<PartialResultCallback<'_>>,
    ) -> Result<Vec<TranslatedSubtitle>, BackendError> {
        self.process_with_token(video_id, target_language, mode, on_progress, on_partial, CancellationToken::new())
            .await
    }

    /// Same as `process`, aborted when `token` is cancelled
    pub async fn process_with_token(
        &self,
        video_id: &str,
        target_language: &str,
        mode: ProcessMode,
        on_progress: Option<ProgressCallback<'_>>,
        on_partial: Option<PartialResultCallback<'_>>,
        token: CancellationToken,
    ) -> Result<Vec<TranslatedSubtitle>, BackendError> {
        let protocol = self.protocol()?;
        info!("Processing {} -> {} via {} backend", video_id, target_language, protocol.name());

        let report = |event: ProgressEvent| {
            if let Some(callback) = on_progress {
                callback(event);
            }
        };

        match protocol {
            BackendProtocol::Job { base } => {
                let deadline = Deadline::with_token(Duration::from_secs(self.config.job_timeout_secs), token);
                self.run_job(&base, video_id, target_language, &deadline, &report).await
            }
            BackendProtocol::SyncJson { base } => {
                let deadline = Deadline::with_token(Duration::from_secs(self.config.request_timeout_secs), token);
                self.run_sync(&base, video_id, target_language, &deadline, &report).await
            }
            BackendProtocol::EventStream { base } => {
                let deadline = Deadline::with_token(Duration::from_secs(self.config.request_timeout_secs), token);
                let endpoint = match mode {
                    ProcessMode::Single => format!("{}/process", base),
                    ProcessMode::Streaming => format!("{}/stream", base),
                };
                self.run_event_stream(&endpoint, video_id, target_language, &deadline, &report, on_partial)
                    .await
            }
        }
    }

    fn request_body(&self, video_id: &str, target_language: &str) -> Value {
        json!({
            "videoId": video_id,
            "targetLanguage": target_language,
            "forceWhisper": self.config.force_whisper,
        })
    }

    async fn run_job(
        &self,
        base: &str,
        video_id: &str,
        target_language: &str,
        deadline: &Deadline,
        report: &(dyn Fn(ProgressEvent) + Send + Sync),
    ) -> Result<Vec<TranslatedSubtitle>, BackendError> {
        let bearer = self.config.bearer().ok_or_else(|| {
            BackendError::Configuration("An API key is required for job-based backends".to_string())
        })?;

        let payload = json!({
            "input": {
                "video_id": video_id,
                "target_lang": target_language,
                "force_whisper": self.config.force_whisper,
            }
        });
        let submitted = deadline
            .run(self.transport.post_json(&format!("{}/run", base), &payload, Some(bearer)))
            .await?;
        if let Some(message) = error_message(&submitted) {
            return Err(BackendError::Remote(message));
        }
        let job_id = submitted
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::Protocol("Job submission returned no id".to_string()))?
            .to_string();

        info!("Submitted job {}", job_id);
        report(ProgressEvent::new("queued", format!("Job {} submitted", job_id)).with_percent(1.0));

        let status_url = format!("{}/status/{}", base, job_id);
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut last_status = String::new();

        loop {
            deadline.sleep(poll_interval).await?;
            let status = deadline
                .run(self.transport.get_json(&status_url, Some(bearer)))
                .await?;
            let state = status.get("status").and_then(Value::as_str).unwrap_or("UNKNOWN");

            match state {
                "COMPLETED" => {
                    info!("Job {} completed", job_id);
                    let subtitles = extract_job_output(status.get("output").unwrap_or(&Value::Null))?;
                    report(ProgressEvent::new("complete", "Job completed").with_percent(100.0));
                    return Ok(subtitles);
                }
                "FAILED" | "TIMED_OUT" => {
                    let message = error_message(&status)
                        .or_else(|| status.get("output").and_then(error_message))
                        .unwrap_or_else(|| format!("Job {} ended with status {}", job_id, state));
                    return Err(BackendError::Remote(message));
                }
                "CANCELLED" => {
                    return Err(BackendError::Remote(format!("Job {} was cancelled", job_id)));
                }
                other => {
                    if other != last_status {
                        debug!("Job {} is {}", job_id, other);
                        last_status = other.to_string();
                    }
                    let mut event = ProgressEvent::new("processing", format!("Job status: {}", other));
                    if let Some(percent) = job_status_percent(other) {
                        event = event.with_percent(percent);
                    }
                    report(event);
                }
            }
        }
    }

    async fn run_sync(
        &self,
        base: &str,
        video_id: &str,
        target_language: &str,
        deadline: &Deadline,
        report: &(dyn Fn(ProgressEvent) + Send + Sync),
    ) -> Result<Vec<TranslatedSubtitle>, BackendError> {
        report(ProgressEvent::new("processing", "Waiting for the service"));
        let body = self.request_body(video_id, target_language);
        let response = deadline
            .run(self.transport.post_json(&format!("{}/process", base), &body, self.config.bearer()))
            .await?;

        if let Some(message) = error_message(&response) {
            return Err(BackendError::Remote(message));
        }
        let subtitles = response
            .get("subtitles")
            .or_else(|| response.get("result").and_then(|r| r.get("subtitles")))
            .ok_or_else(|| BackendError::Protocol("Response has neither subtitles nor error".to_string()))?;

        let result = parse_subtitles(subtitles)?;
        report(ProgressEvent::new("complete", "Processing complete").with_percent(100.0));
        Ok(result)
    }

    async fn run_event_stream(
        &self,
        endpoint: &str,
        video_id: &str,
        target_language: &str,
        deadline: &Deadline,
        report: &(dyn Fn(ProgressEvent) + Send + Sync),
        on_partial: Option<PartialResultCallback<'_>>,
    ) -> Result<Vec<TranslatedSubtitle>, BackendError> {
        let body = self.request_body(video_id, target_language);
        let mut stream = deadline
            .run(self.transport.post_event_stream(endpoint, &body, self.config.bearer()))
            .await?;

        let mut parser = SseParser::new();
        let mut accumulated: Vec<TranslatedSubtitle> = Vec::new();

        loop {
            let next = deadline.run(async { Ok(stream.next().await) }).await?;
            let events = match next {
                Some(chunk) => parser.feed_bytes(&chunk?),
                None => break,
            };
            for event in events {
                if let Some(result) = dispatch_event(&event, &mut accumulated, report, on_partial)? {
                    return Ok(result);
                }
            }
        }

        for event in parser.finish() {
            if let Some(result) = dispatch_event(&event, &mut accumulated, report, on_partial)? {
                return Ok(result);
            }
        }

        if accumulated.is_empty() {
            Err(BackendError::Protocol("Stream ended without a result".to_string()))
        } else {
            warn!("Stream ended without a final result, using {} streamed subtitles", accumulated.len());
            Ok(accumulated)
        }
    }
}

/// Handle one decoded event; `Some` carries the final result
fn dispatch_event(
    event: &SseEvent,
    accumulated: &mut Vec<TranslatedSubtitle>,
    report: &(dyn Fn(ProgressEvent) + Send + Sync),
    on_partial: Option<PartialResultCallback<'_>>,
) -> Result<Option<Vec<TranslatedSubtitle>>, BackendError> {
    let payload: Value = match serde_json::from_str(&event.data) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Skipping malformed event data: {}", e);
            return Ok(None);
        }
    };

    if let Some(message) = error_message(&payload) {
        return Err(BackendError::Remote(message));
    }

    if let Some(result) = payload.get("result") {
        let subtitles = result
            .get("subtitles")
            .ok_or_else(|| BackendError::Protocol("Final event has no subtitles".to_string()))?;
        return parse_subtitles(subtitles).map(Some);
    }

    let stage = payload.get("stage").and_then(Value::as_str);

    if stage == Some("subtitles") {
        if let Some(subtitles) = payload.get("subtitles") {
            match parse_subtitles(subtitles) {
                Ok(batch) => {
                    accumulated.extend(batch);
                    let batch_info: Option<BatchInfo> = payload
                        .get("batchInfo")
                        .and_then(|info| serde_json::from_value(info.clone()).ok());
                    debug!("Received partial batch, {} subtitles so far", accumulated.len());
                    if let Some(callback) = on_partial {
                        callback(accumulated.as_slice(), batch_info);
                    }
                }
                Err(e) => warn!("Skipping malformed partial result: {}", e),
            }
            return Ok(None);
        }
    }

    if stage.is_some() {
        match serde_json::from_value::<ProgressEvent>(payload) {
            Ok(progress) => report(progress),
            Err(e) => warn!("Skipping malformed progress event: {}", e),
        }
        return Ok(None);
    }

    debug!("Ignoring event without a known shape");
    Ok(None)
}

/// Text of a non-null `error` field
fn error_message(value: &Value) -> Option<String> {
    match value.get("error")? {
        Value::Null => None,
        Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}

fn parse_subtitles(value: &Value) -> Result<Vec<TranslatedSubtitle>, BackendError> {
    let mut subtitles: Vec<TranslatedSubtitle> = serde_json::from_value(value.clone())
        .map_err(|e| BackendError::Protocol(format!("Invalid subtitles: {}", e)))?;

    for subtitle in &mut subtitles {
        if subtitle.translated_text.is_empty() {
            subtitle.translated_text = subtitle.text.clone();
        }
    }
    Ok(subtitles)
}

/// Subtitles of a completed job; `output` is an object or a list of objects
pub fn extract_job_output(output: &Value) -> Result<Vec<TranslatedSubtitle>, BackendError> {
    let parts: Vec<&Value> = match output {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![output],
        Value::Null => return Err(BackendError::Protocol("Completed job returned no output".to_string())),
        other => return Err(BackendError::Protocol(format!("Unexpected job output: {}", other))),
    };

    let mut subtitles = Vec::new();
    for part in parts {
        if let Some(message) = error_message(part) {
            return Err(BackendError::Remote(message));
        }
        let list = part
            .get("subtitles")
            .ok_or_else(|| BackendError::Protocol("Job output has no subtitles".to_string()))?;
        subtitles.extend(parse_subtitles(list)?);
    }
    Ok(subtitles)
}
