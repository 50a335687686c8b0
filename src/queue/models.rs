/*!
 * Queue item model.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a queue item: Pending, then Processing, then Completed or Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    /// Waiting for the worker
    Pending,
    /// Picked up by the worker
    Processing,
    /// Translated and cached
    Completed,
    /// Gave up; `error` says why
    Failed,
}

impl QueueStatus {
    /// Completed and Failed never change again
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Pending and Processing block a duplicate enqueue
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueStatus::Pending => write!(f, "pending"),
            QueueStatus::Processing => write!(f, "processing"),
            QueueStatus::Completed => write!(f, "completed"),
            QueueStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A queued translation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// `<videoId>_<addedAt>`
    pub id: String,
    pub video_id: String,
    #[serde(default)]
    pub title: String,
    pub target_language: String,
    pub status: QueueStatus,
    /// Milliseconds since the epoch
    pub added_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueueItem {
    pub fn new(video_id: &str, title: &str, target_language: &str, added_at: i64) -> Self {
        Self {
            id: format!("{}_{}", video_id, added_at),
            video_id: video_id.to_string(),
            title: title.to_string(),
            target_language: target_language.to_string(),
            status: QueueStatus::Pending,
            added_at,
            completed_at: None,
            error: None,
        }
    }

    /// Same video and target language
    pub fn same_job(&self, video_id: &str, target_language: &str) -> bool {
        self.video_id == video_id && self.target_language == target_language
    }
}
