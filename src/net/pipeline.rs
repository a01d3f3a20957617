//! Message Pipeline (spec.md §4.E): size gate → JSON parse → schema
//! validate by type → dispatch. Ties `message.rs` parsing to the registry's
//! relay operation; the connection task (see `http/ws.rs`) turns the
//! resulting [`PipelineAction`] into an actual frame send / close.

use crate::error::ErrorCode;
use crate::metrics::Metrics;
use crate::net::message::{parse_and_validate, MessageBody};
use crate::net::registry::{ChannelRegistry, RelayStatus};
use crate::net::types::{ChannelId, PeerId};

/// What the connection task should do after the pipeline has processed one
/// inbound frame.
pub enum PipelineAction {
    /// Nothing further: the frame was relayed, or silently dropped (the
    /// `ack`-with-no-peer case, spec.md §4.E step 5).
    None,
    /// Emit an `error` frame; close the socket afterward only if the error
    /// is non-recoverable per the catalog.
    Error {
        code: ErrorCode,
        message: String,
        message_id: Option<String>,
        close: bool,
    },
}

impl PipelineAction {
    fn error(code: ErrorCode, message: impl Into<String>, message_id: Option<String>) -> Self {
        Self::Error {
            close: !code.recoverable(),
            code,
            message: message.into(),
            message_id,
        }
    }
}

pub struct Pipeline<'a> {
    pub registry: &'a ChannelRegistry,
    pub metrics: &'a Metrics,
    pub max_message_size: usize,
}

impl<'a> Pipeline<'a> {
    pub fn new(registry: &'a ChannelRegistry, metrics: &'a Metrics, max_message_size: usize) -> Self {
        Self {
            registry,
            metrics,
            max_message_size,
        }
    }

    /// Runs the full five-step algorithm against one inbound frame.
    pub async fn process(&self, channel_id: &ChannelId, peer_id: &PeerId, raw: &str) -> PipelineAction {
        if raw.len() > self.max_message_size {
            self.metrics.record_error(ErrorCode::MessageTooLarge).await;
            return PipelineAction::error(ErrorCode::MessageTooLarge, "message exceeds the configured size limit", None);
        }

        let message = match parse_and_validate(raw) {
            Ok(message) => message,
            Err(err) => {
                self.metrics.record_error(err.code).await;
                return PipelineAction::error(err.code, err.detail, None);
            }
        };

        match &message.body {
            MessageBody::Data(_) | MessageBody::Control(_) => {
                if !self.registry.has_peer(channel_id, peer_id).await {
                    self.metrics.record_error(ErrorCode::NoPeerConnected).await;
                    return PipelineAction::error(
                        ErrorCode::NoPeerConnected,
                        "no peer connected to relay to",
                        Some(message.id().to_string()),
                    );
                }

                let outcome = self.registry.relay_to_peer(channel_id, peer_id, raw).await;
                match outcome.status {
                    Some(RelayStatus::Sent) | Some(RelayStatus::Queued) => PipelineAction::None,
                    Some(RelayStatus::Dropped) | None => {
                        self.metrics.record_error(ErrorCode::NoPeerConnected).await;
                        PipelineAction::error(
                            ErrorCode::NoPeerConnected,
                            "peer disconnected",
                            Some(message.id().to_string()),
                        )
                    }
                }
            }
            MessageBody::Ack(_) => {
                // Silently dropped when the peer is absent (spec.md §4.E,
                // §9 Open Question): the peer likely just left, and
                // surfacing an error here would create a notification
                // storm right after disconnect.
                if self.registry.has_peer(channel_id, peer_id).await {
                    self.registry.relay_to_peer(channel_id, peer_id, raw).await;
                }
                PipelineAction::None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::transport::{PeerSink, SendOutcome};
    use chrono::Utc;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    struct TestSink {
        sent: Mutex<Vec<String>>,
    }

    impl TestSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl PeerSink for TestSink {
        async fn send_text(&self, frame: String) -> SendOutcome {
            let len = frame.len();
            self.sent.lock().await.push(frame);
            SendOutcome::Sent(len)
        }

        async fn close(&self, _code: u16, _reason: String) -> bool {
            true
        }
    }

    fn envelope(kind: &str, payload: serde_json::Value) -> String {
        serde_json::json!({
            "header": {"type": kind, "id": Uuid::new_v4().to_string(), "timestamp": Utc::now().to_rfc3339()},
            "payload": payload,
        })
        .to_string()
    }

    #[tokio::test]
    async fn oversize_frame_is_recoverable() {
        let metrics = Metrics::new();
        let registry = ChannelRegistry::new(4, Arc::new(Metrics::new()));
        let pipeline = Pipeline::new(&registry, &metrics, 8);
        let channel_id = ChannelId::parse("AAAA1111").unwrap();
        let peer_id = PeerId::parse("a").unwrap();

        let action = pipeline
            .process(&channel_id, &peer_id, &"x".repeat(100))
            .await;
        match action {
            PipelineAction::Error { code, close, .. } => {
                assert_eq!(code, ErrorCode::MessageTooLarge);
                assert!(!close);
            }
            PipelineAction::None => panic!("expected error"),
        }
    }

    #[tokio::test]
    async fn data_with_no_peer_is_recoverable_error() {
        let metrics = Metrics::new();
        let registry = ChannelRegistry::new(4, Arc::new(Metrics::new()));
        let channel_id = ChannelId::parse("AAAA1111").unwrap();
        let peer_id = PeerId::parse("a").unwrap();
        registry
            .add_peer(&channel_id, peer_id.clone(), TestSink::new(), None)
            .await
            .unwrap();
        let pipeline = Pipeline::new(&registry, &metrics, 1024);

        let raw = envelope("data", serde_json::json!({"contentType": "text", "data": "hi"}));
        let action = pipeline.process(&channel_id, &peer_id, &raw).await;
        match action {
            PipelineAction::Error { code, close, .. } => {
                assert_eq!(code, ErrorCode::NoPeerConnected);
                assert!(!close);
            }
            PipelineAction::None => panic!("expected error"),
        }
    }

    #[tokio::test]
    async fn ack_with_no_peer_is_silently_dropped() {
        let metrics = Metrics::new();
        let registry = ChannelRegistry::new(4, Arc::new(Metrics::new()));
        let channel_id = ChannelId::parse("AAAA1111").unwrap();
        let peer_id = PeerId::parse("a").unwrap();
        registry
            .add_peer(&channel_id, peer_id.clone(), TestSink::new(), None)
            .await
            .unwrap();
        let pipeline = Pipeline::new(&registry, &metrics, 1024);

        let raw = envelope(
            "ack",
            serde_json::json!({"messageId": Uuid::new_v4().to_string(), "status": "success"}),
        );
        let action = pipeline.process(&channel_id, &peer_id, &raw).await;
        assert!(matches!(action, PipelineAction::None));
    }

    #[tokio::test]
    async fn data_relays_byte_identical_frame() {
        let metrics = Metrics::new();
        let registry = ChannelRegistry::new(4, Arc::new(Metrics::new()));
        let channel_id = ChannelId::parse("AAAA1111").unwrap();
        let a = PeerId::parse("a").unwrap();
        let b = PeerId::parse("b").unwrap();
        let b_sink = TestSink::new();
        registry.add_peer(&channel_id, a.clone(), TestSink::new(), None).await.unwrap();
        registry.add_peer(&channel_id, b.clone(), b_sink.clone(), None).await.unwrap();

        let pipeline = Pipeline::new(&registry, &metrics, 1024 * 1024);
        let raw = envelope("data", serde_json::json!({"contentType": "text", "data": "hi"}));
        let action = pipeline.process(&channel_id, &a, &raw).await;
        assert!(matches!(action, PipelineAction::None));

        let sent = b_sink.sent.lock().await;
        assert_eq!(sent.last().unwrap(), &raw);
    }
}
