/*!
 * Delivery of live updates to whoever is watching.
 *
 * The core pushes progress, streamed partial results and queue changes
 * through `LiveView`. Delivery is fire-and-forget: a viewer that went away
 * simply stops receiving messages.
 */

use serde::Serialize;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::progress::{BatchInfo, ProgressEvent};
use crate::queue::QueueItem;
use crate::subtitle_processor::TranslatedSubtitle;

/// A message pushed to the live view
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ViewMessage {
    Progress {
        video_id: Option<String>,
        event: ProgressEvent,
    },
    PartialResult {
        video_id: String,
        subtitles: Vec<TranslatedSubtitle>,
        batch_info: Option<BatchInfo>,
    },
    QueueUpdated {
        items: Vec<QueueItem>,
    },
}

/// Receiver of live updates
pub trait LiveView: Send + Sync {
    fn deliver(&self, message: ViewMessage);
}

/// Forwards messages into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelView {
    sender: UnboundedSender<ViewMessage>,
}

impl ChannelView {
    pub fn new() -> (Self, UnboundedReceiver<ViewMessage>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl LiveView for ChannelView {
    fn deliver(&self, message: ViewMessage) {
        // closed receiver means nobody is watching
        let _ = self.sender.send(message);
    }
}

/// Discards every message
#[derive(Debug, Clone, Copy, Default)]
pub struct NullView;

impl LiveView for NullView {
    fn deliver(&self, _message: ViewMessage) {}
}
