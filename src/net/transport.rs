//! The host WS runtime surface the core assumes (spec.md §1, §9): accept
//! upgrade with attached per-connection data, send text frame with a
//! tri-state result, close with code+reason. `PeerSink` is the core's view
//! of "a socket it can write to"; `AxumPeerSink` is the one concrete adapter,
//! built on `axum::extract::ws`.
//!
//! Grounded on the teacher's `net/peer.rs` outbound path: a per-peer
//! `tx: mpsc::Sender<Message>` paired with a `try_send`-based non-blocking
//! enqueue, with one task owning the actual socket and draining the
//! channel in order. That shape is reused directly here instead of holding
//! the write half behind a plain mutex, because only a dedicated drainer
//! task can keep driving a backpressured write to completion once the
//! caller has moved on.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::mpsc;

/// Outbound queue depth before a send is reported as backpressured
/// (`SendOutcome::Queued`) rather than immediately accepted.
const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Tagged tri-state send result (§9 Design Notes), replacing a raw
/// `isize` return so the backpressure policy stays explicit at every call
/// site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(usize),
    Queued,
    Dropped,
}

/// What the registry and relay layer need from a live socket: send a text
/// frame, close with a code and reason. Implemented once for the real axum
/// websocket; a test double implements it for in-process property tests.
#[async_trait::async_trait]
pub trait PeerSink: Send + Sync {
    async fn send_text(&self, frame: String) -> SendOutcome;
    /// Returns `false` if the close frame could not be written (the socket
    /// was already gone); `closeAll` collects these as per-socket errors.
    async fn close(&self, code: u16, reason: String) -> bool;
}

/// Adapter over an axum websocket's write half. The write half itself is
/// owned by a single background task spawned in [`AxumPeerSink::new`],
/// which drains an outbound `mpsc` channel and writes frames to the socket
/// in order — this preserves spec.md §5's single-sender ordering guarantee
/// and means a backpressured write is still driven to completion by that
/// task even after `send_text` has already returned.
pub struct AxumPeerSink {
    tx: mpsc::Sender<WsMessage>,
}

impl AxumPeerSink {
    pub fn new(mut sink: SplitSink<WebSocket, WsMessage>) -> Arc<Self> {
        let (tx, mut rx) = mpsc::channel::<WsMessage>(OUTBOUND_QUEUE_CAPACITY);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });
        Arc::new(Self { tx })
    }
}

#[async_trait::async_trait]
impl PeerSink for AxumPeerSink {
    async fn send_text(&self, frame: String) -> SendOutcome {
        let len = frame.len();
        match self.tx.try_send(WsMessage::Text(frame)) {
            Ok(()) => SendOutcome::Sent(len),
            Err(mpsc::error::TrySendError::Full(message)) => {
                // The drainer task is behind; hand it off to finish enqueuing
                // in the background instead of blocking the caller or
                // dropping the frame. Ordering is preserved: this task's
                // `send` waits for the same channel the drainer reads
                // in-order from.
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(message).await;
                });
                SendOutcome::Queued
            }
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Dropped,
        }
    }

    async fn close(&self, code: u16, reason: String) -> bool {
        self.tx
            .send(WsMessage::Close(Some(CloseFrame {
                code,
                reason: reason.into(),
            })))
            .await
            .is_ok()
    }
}
