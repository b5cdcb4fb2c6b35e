use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::status::ProcessingStatus;

/// One persisted status transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub document_id: String,
    pub status: ProcessingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn new(document_id: &str, status: ProcessingStatus, detail: Option<&str>) -> Self {
        Self {
            document_id: document_id.to_string(),
            status,
            detail: detail.map(str::to_string),
            timestamp: Utc::now(),
        }
    }
}

/// Fans status transitions of all documents out to subscribers.
#[derive(Clone)]
pub struct StatusBroadcaster {
    sender: Arc<broadcast::Sender<StatusUpdate>>,
}

impl StatusBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, update: StatusUpdate) {
        // No receivers is fine
        let _ = self.sender.send(update);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.sender.subscribe()
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new(crate::pipeline::config::DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_updates() {
        let broadcaster = StatusBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();
        broadcaster.send(StatusUpdate::new("doc", ProcessingStatus::Queued, None));

        let update = rx.recv().await.unwrap();
        assert_eq!(update.document_id, "doc");
        assert_eq!(update.status, ProcessingStatus::Queued);
    }

    #[test]
    fn test_send_without_subscribers() {
        StatusBroadcaster::default().send(StatusUpdate::new(
            "doc",
            ProcessingStatus::Pending,
            None,
        ));
    }

    #[test]
    fn test_serializes_camel_case() {
        let update = StatusUpdate::new("doc", ProcessingStatus::OcrFailed, Some("interrupted"));
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["documentId"], "doc");
        assert_eq!(json["status"], "ocr_failed");
        assert_eq!(json["detail"], "interrupted");
    }
}
