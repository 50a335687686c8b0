/*!
 * Progress reporting types shared by the translator, the backend client
 * and the queue worker. Progress is informational and never persisted.
 */

use serde::{Deserialize, Serialize};

use crate::subtitle_processor::TranslatedSubtitle;

/// Position of a batch within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchInfo {
    pub current: usize,
    pub total: usize,
}

/// A single progress notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub stage: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_info: Option<BatchInfo>,
}

impl ProgressEvent {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
            percent: None,
            step: None,
            total_steps: None,
            batch_info: None,
        }
    }

    pub fn with_percent(mut self, percent: f64) -> Self {
        self.percent = Some(percent.clamp(0.0, 100.0));
        self
    }

    pub fn with_batch(mut self, current: usize, total: usize) -> Self {
        self.batch_info = Some(BatchInfo { current, total });
        self
    }
}

/// Receives progress notifications
pub type ProgressCallback<'a> = &'a (dyn Fn(ProgressEvent) + Send + Sync);

/// Receives the accumulated subtitles each time a streamed batch arrives
pub type PartialResultCallback<'a> = &'a (dyn Fn(&[TranslatedSubtitle], Option<BatchInfo>) + Send + Sync);
