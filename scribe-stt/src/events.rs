//! Transcription lifecycle notifications.
//!
//! The factory holds an [`EventNotifier`]; hosts that want notifications pass
//! in the sending half of a channel and read events on their own task.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::provider::ErrorKind;

/// Lifecycle event emitted by the factory.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptionEvent {
    Started {
        request_id: String,
        provider: String,
        at: DateTime<Utc>,
    },
    Completed {
        request_id: String,
        provider: String,
        processing_time_ms: u64,
        at: DateTime<Utc>,
    },
    Failed {
        request_id: String,
        provider: String,
        kind: ErrorKind,
        message: String,
        at: DateTime<Utc>,
    },
    /// A preferred provider was unavailable and another was used
    ProviderSubstituted {
        request_id: String,
        preferred: String,
        provider: String,
        at: DateTime<Utc>,
    },
    /// A retryable failure sent the request to another provider
    FallbackTriggered {
        request_id: String,
        from: String,
        to: String,
        kind: ErrorKind,
        at: DateTime<Utc>,
    },
}

impl TranscriptionEvent {
    pub fn request_id(&self) -> &str {
        match self {
            Self::Started { request_id, .. }
            | Self::Completed { request_id, .. }
            | Self::Failed { request_id, .. }
            | Self::ProviderSubstituted { request_id, .. }
            | Self::FallbackTriggered { request_id, .. } => request_id,
        }
    }
}

/// Optional sink for [`TranscriptionEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct EventNotifier {
    sender: Option<UnboundedSender<TranscriptionEvent>>,
}

impl EventNotifier {
    /// Notifier that drops every event.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(sender: UnboundedSender<TranscriptionEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Notifier plus the receiving half of a fresh channel.
    pub fn channel() -> (Self, UnboundedReceiver<TranscriptionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Deliver an event; a closed receiver is not an error.
    pub fn notify(&self, event: TranscriptionEvent) {
        if let Some(ref sender) = self.sender {
            if sender.send(event).is_err() {
                tracing::trace!("Event receiver dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(id: &str) -> TranscriptionEvent {
        TranscriptionEvent::Started {
            request_id: id.into(),
            provider: "whisper".into(),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_channel_delivers_events() {
        let (notifier, mut rx) = EventNotifier::channel();
        notifier.notify(started("req-1"));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.request_id(), "req-1");
    }

    #[test]
    fn test_disabled_and_closed_are_silent() {
        EventNotifier::disabled().notify(started("req-2"));

        let (notifier, rx) = EventNotifier::channel();
        drop(rx);
        notifier.notify(started("req-3"));
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let json = serde_json::to_value(started("req-4")).unwrap();
        assert_eq!(json["type"], "started");
        assert_eq!(json["provider"], "whisper");
    }
}
