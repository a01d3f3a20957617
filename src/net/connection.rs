//! Per-socket state machine (spec.md §4.D): `admitted → ready → closing`.
//!
//! Grounded on the teacher's `PeerState` enum (`net/types.rs`, narrowed from
//! its `Connecting → Connected → Handshaking → Ready → Disconnecting →
//! Disconnected` chain down to the relay's three states, since this
//! protocol authenticates entirely at upgrade time and has no in-band
//! handshake). `ConnectionData` is mutated only by the task that owns the
//! socket, matching the teacher's single-writer discipline per peer.

use chrono::{DateTime, Utc};

use crate::net::types::{ChannelId, ClientInfo, PeerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Admitted,
    Ready,
    Closing,
}

/// Attached to a socket at upgrade time (spec.md §3 `ConnectionData`).
#[derive(Debug, Clone)]
pub struct ConnectionData {
    pub channel_id: ChannelId,
    pub peer_id: PeerId,
    pub connected_at: DateTime<Utc>,
    pub phase: ConnectionPhase,
    pub client_info: Option<ClientInfo>,
}

impl ConnectionData {
    pub fn new(channel_id: ChannelId, peer_id: PeerId, client_info: Option<ClientInfo>) -> Self {
        Self {
            channel_id,
            peer_id,
            connected_at: Utc::now(),
            phase: ConnectionPhase::Admitted,
            client_info,
        }
    }

    pub fn mark_ready(&mut self) {
        self.phase = ConnectionPhase::Ready;
    }

    pub fn mark_closing(&mut self) {
        self.phase = ConnectionPhase::Closing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_admitted_and_transitions_forward() {
        let mut data = ConnectionData::new(
            ChannelId::parse("AAAA1111").unwrap(),
            PeerId::parse("a").unwrap(),
            None,
        );
        assert_eq!(data.phase, ConnectionPhase::Admitted);
        data.mark_ready();
        assert_eq!(data.phase, ConnectionPhase::Ready);
        data.mark_closing();
        assert_eq!(data.phase, ConnectionPhase::Closing);
    }
}
