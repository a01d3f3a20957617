//! Construction of the three server-originated system messages (spec.md
//! §4.F): `ready`, `peer`, `error`. Each shares the `{header, payload}`
//! envelope and gets a fresh UUID + current timestamp (`Header::new`).

use serde::Serialize;

use crate::error::ErrorCode;
use crate::net::message::Header;
use crate::net::types::{ClientInfo, PeerId};

#[derive(Debug, Clone, Serialize)]
pub struct PeerSummary {
    #[serde(rename = "peerId")]
    pub peer_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ClientInfo>,
}

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    header: Header,
    payload: T,
}

fn render<T: Serialize>(kind: &str, payload: T) -> String {
    let envelope = Envelope {
        header: Header::new(kind),
        payload,
    };
    serde_json::to_string(&envelope).expect("outbound envelope always serializes")
}

#[derive(Serialize)]
struct ReadyPayload {
    #[serde(rename = "peerId")]
    peer_id: String,
    #[serde(rename = "channelId")]
    channel_id: String,
    peer: Option<PeerSummary>,
}

/// Emitted once to a peer immediately after admission (spec.md §4.F).
pub fn ready_frame(peer_id: &PeerId, channel_id: &str, existing_peer: Option<PeerSummary>) -> String {
    render(
        "ready",
        ReadyPayload {
            peer_id: peer_id.as_str().to_string(),
            channel_id: channel_id.to_string(),
            peer: existing_peer,
        },
    )
}

#[derive(Serialize)]
struct PeerEventPayload {
    #[serde(rename = "peerId")]
    peer_id: String,
    event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<ClientInfo>,
}

/// Emitted to the other peer when a peer joins the channel.
pub fn peer_joined_frame(peer_id: &PeerId, metadata: Option<ClientInfo>) -> String {
    render(
        "peer",
        PeerEventPayload {
            peer_id: peer_id.as_str().to_string(),
            event: "joined",
            metadata,
        },
    )
}

/// Emitted to the surviving peer when the other peer leaves.
pub fn peer_left_frame(peer_id: &PeerId) -> String {
    let mut metadata = ClientInfo::new();
    metadata.insert(
        "reason".to_string(),
        serde_json::Value::String("connection_closed".to_string()),
    );
    render(
        "peer",
        PeerEventPayload {
            peer_id: peer_id.as_str().to_string(),
            event: "left",
            metadata: Some(metadata),
        },
    )
}

#[derive(Serialize)]
struct ErrorFramePayload {
    code: &'static str,
    message: String,
    #[serde(rename = "messageId", skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
}

/// Builds an `error` frame. The caller decides, from `code.recoverable()`,
/// whether a close should follow.
pub fn error_frame(code: ErrorCode, message: &str, message_id: Option<&str>) -> String {
    render(
        "error",
        ErrorFramePayload {
            code: code.as_str(),
            message: message.to_string(),
            message_id: message_id.map(str::to_string),
        },
    )
}
