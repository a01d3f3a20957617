//! Integration-level coverage of spec.md §8's concrete scenarios, run
//! in-process against `ChannelRegistry`/`Pipeline` directly rather than a
//! subprocess harness — these properties don't need a running server, and
//! the teacher's own `tests/net_test.rs` subprocess pattern exists only
//! because it exercises real TCP reconnection, which this relay has no
//! analog of.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay::error::ErrorCode;
use relay::metrics::Metrics;
use relay::net::pipeline::{Pipeline, PipelineAction};
use relay::net::registry::ChannelRegistry;
use relay::net::transport::{PeerSink, SendOutcome};
use relay::net::types::{ChannelId, PeerId};
use tokio::sync::Mutex;
use uuid::Uuid;

struct RecordingSink {
    received: Mutex<Vec<String>>,
    closes: AtomicUsize,
}

impl RecordingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            received: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl PeerSink for RecordingSink {
    async fn send_text(&self, frame: String) -> SendOutcome {
        let len = frame.len();
        self.received.lock().await.push(frame);
        SendOutcome::Sent(len)
    }

    async fn close(&self, _code: u16, _reason: String) -> bool {
        self.closes.fetch_add(1, Ordering::SeqCst);
        true
    }
}

fn data_frame(text: &str) -> String {
    serde_json::json!({
        "header": {"type": "data", "id": Uuid::new_v4().to_string(), "timestamp": chrono::Utc::now().to_rfc3339()},
        "payload": {"contentType": "text", "data": text},
    })
    .to_string()
}

/// Scenario 1: happy pair — `ready`, `peer(joined)`, and a round-tripped
/// `data` frame.
#[tokio::test]
async fn happy_pair_round_trip() {
    let metrics = Arc::new(Metrics::new());
    let registry = ChannelRegistry::new(4, metrics.clone());
    let channel_id = ChannelId::parse("AAAA1111").unwrap();
    let a = PeerId::parse("a").unwrap();
    let b = PeerId::parse("b").unwrap();
    let a_sink = RecordingSink::new();
    let b_sink = RecordingSink::new();

    let outcome_a = registry.add_peer(&channel_id, a.clone(), a_sink.clone(), None).await.unwrap();
    assert!(outcome_a.existing_peer.is_none());

    let outcome_b = registry.add_peer(&channel_id, b.clone(), b_sink.clone(), None).await.unwrap();
    assert_eq!(outcome_b.existing_peer.unwrap().peer_id, "a");

    // a receives peer(joined) about b.
    let a_received = a_sink.received.lock().await;
    assert_eq!(a_received.len(), 1);
    assert!(a_received[0].contains("\"event\":\"joined\""));
    drop(a_received);

    let pipeline = Pipeline::new(&registry, &metrics, 1024 * 1024);
    let frame = data_frame("hi");
    let action = pipeline.process(&channel_id, &b, &frame).await;
    assert!(matches!(action, PipelineAction::None));

    let a_received = a_sink.received.lock().await;
    assert_eq!(a_received.last().unwrap(), &frame);
}

/// Scenario 2: channel full — a third admission attempt is rejected with
/// no state change.
#[tokio::test]
async fn channel_full_rejects_third_peer() {
    let registry = ChannelRegistry::new(4, Arc::new(Metrics::new()));
    let channel_id = ChannelId::parse("AAAA1111").unwrap();
    registry
        .add_peer(&channel_id, PeerId::parse("a").unwrap(), RecordingSink::new(), None)
        .await
        .unwrap();
    registry
        .add_peer(&channel_id, PeerId::parse("b").unwrap(), RecordingSink::new(), None)
        .await
        .unwrap();

    let err = registry
        .add_peer(&channel_id, PeerId::parse("c").unwrap(), RecordingSink::new(), None)
        .await
        .unwrap_err();

    let code: ErrorCode = err.into();
    assert_eq!(code, ErrorCode::ChannelFull);
    assert_eq!(registry.peer_count(&channel_id).await, 2);
}

/// Scenario 3: duplicate peer id — tombstone check keeps the legitimate
/// peer's record intact.
#[tokio::test]
async fn duplicate_peer_id_tombstone_safety() {
    let registry = ChannelRegistry::new(4, Arc::new(Metrics::new()));
    let channel_id = ChannelId::parse("AAAA1111").unwrap();
    let legit = RecordingSink::new();
    registry
        .add_peer(&channel_id, PeerId::parse("a").unwrap(), legit.clone(), None)
        .await
        .unwrap();

    let impostor: Arc<dyn PeerSink> = RecordingSink::new();
    let err = registry
        .add_peer(&channel_id, PeerId::parse("a").unwrap(), impostor.clone(), None)
        .await
        .unwrap_err();
    let code: ErrorCode = err.into();
    assert_eq!(code, ErrorCode::DuplicatePeerId);

    // The rejected socket's close event must not evict the legitimate peer.
    registry
        .remove_peer(&channel_id, &PeerId::parse("a").unwrap(), &impostor)
        .await;
    assert_eq!(registry.peer_count(&channel_id).await, 1);
}

/// Scenario 4: backpressure survives — a `Queued` send keeps the
/// connection counted as delivered and open.
#[tokio::test]
async fn backpressure_survives_as_queued() {
    struct QueuedSink;
    #[async_trait::async_trait]
    impl PeerSink for QueuedSink {
        async fn send_text(&self, _frame: String) -> SendOutcome {
            SendOutcome::Queued
        }
        async fn close(&self, _code: u16, _reason: String) -> bool {
            true
        }
    }

    let registry = ChannelRegistry::new(4, Arc::new(Metrics::new()));
    let channel_id = ChannelId::parse("AAAA1111").unwrap();
    registry
        .add_peer(&channel_id, PeerId::parse("a").unwrap(), RecordingSink::new(), None)
        .await
        .unwrap();
    registry
        .add_peer(&channel_id, PeerId::parse("b").unwrap(), Arc::new(QueuedSink), None)
        .await
        .unwrap();

    let outcome = registry
        .relay_to_peer(&channel_id, &PeerId::parse("a").unwrap(), "frame")
        .await;
    assert!(outcome.sent);
    assert_eq!(registry.peer_count(&channel_id).await, 2);
}

/// Scenario 5: rate limit — the window allows `maxConnections` attempts,
/// then rejects until the window resets.
#[tokio::test]
async fn rate_limit_window_then_reset() {
    let limiter = relay::net::rate_limit::RateLimiter::new(2, Duration::from_millis(30));
    let ip: std::net::IpAddr = "127.0.0.1".parse().unwrap();
    assert!(limiter.check(ip).await);
    assert!(limiter.check(ip).await);
    assert!(!limiter.check(ip).await);

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(limiter.check(ip).await);
    limiter.stop().await;
}

/// Scenario 6: oversize frame — recoverable `MESSAGE_TOO_LARGE`, socket
/// stays open, the other peer receives nothing.
#[tokio::test]
async fn oversize_frame_does_not_reach_peer() {
    let metrics = Arc::new(Metrics::new());
    let registry = ChannelRegistry::new(4, metrics.clone());
    let channel_id = ChannelId::parse("AAAA1111").unwrap();
    let a = PeerId::parse("a").unwrap();
    let b_sink = RecordingSink::new();
    registry.add_peer(&channel_id, a.clone(), RecordingSink::new(), None).await.unwrap();
    registry
        .add_peer(&channel_id, PeerId::parse("b").unwrap(), b_sink.clone(), None)
        .await
        .unwrap();

    let pipeline = Pipeline::new(&registry, &metrics, 1024);
    let oversized = data_frame(&"x".repeat(2048));
    let action = pipeline.process(&channel_id, &a, &oversized).await;
    match action {
        PipelineAction::Error { code, close, .. } => {
            assert_eq!(code, ErrorCode::MessageTooLarge);
            assert!(!close);
        }
        PipelineAction::None => panic!("expected MESSAGE_TOO_LARGE"),
    }

    // b's peer(joined) notification is the only thing it ever received.
    let received = b_sink.received.lock().await;
    assert_eq!(received.len(), 0);
}

/// Property: an empty channel is never present in the registry.
#[tokio::test]
async fn mirror_cleanup_after_both_peers_leave() {
    let registry = ChannelRegistry::new(4, Arc::new(Metrics::new()));
    let channel_id = ChannelId::parse("AAAA1111").unwrap();
    let a_sink: Arc<dyn PeerSink> = RecordingSink::new();
    let b_sink: Arc<dyn PeerSink> = RecordingSink::new();
    let a = PeerId::parse("a").unwrap();
    let b = PeerId::parse("b").unwrap();
    registry.add_peer(&channel_id, a.clone(), a_sink.clone(), None).await.unwrap();
    registry.add_peer(&channel_id, b.clone(), b_sink.clone(), None).await.unwrap();

    registry.remove_peer(&channel_id, &a, &a_sink).await;
    assert_eq!(registry.channel_count().await, 1);
    registry.remove_peer(&channel_id, &b, &b_sink).await;
    assert_eq!(registry.channel_count().await, 0);
}
