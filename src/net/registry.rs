//! Channel/peer registry (spec.md §4.C) — the core's shared mutable state.
//!
//! Grounded on the teacher's `ConnectionManager` (a single
//! `tokio::sync::Mutex`-guarded map, guarded insert/remove, a `stats()`
//! snapshot copied under lock) and `net/peer.rs`'s `Peer`/`PeerInfo` split
//! between the internal struct (owns the socket) and an external summary.
//! Per spec.md §5, locks never wrap I/O: every method below takes the lock
//! only to read/mutate the map, collects whatever needs sending, releases
//! the lock, then performs the actual send.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::ErrorCode;
use crate::metrics::Metrics;
use crate::net::relay::{peer_joined_frame, peer_left_frame, PeerSummary};
use crate::net::types::{ChannelId, ClientInfo, PeerId, PEERS_PER_CHANNEL};
use crate::net::transport::{PeerSink, SendOutcome};

pub struct Peer {
    pub peer_id: PeerId,
    pub sink: Arc<dyn PeerSink>,
    pub connected_at: DateTime<Utc>,
    pub client_info: Option<ClientInfo>,
}

struct Channel {
    peers: HashMap<PeerId, Peer>,
    created_at: DateTime<Utc>,
}

impl Channel {
    fn new() -> Self {
        Self {
            peers: HashMap::new(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddPeerError {
    MaxChannelsReached,
    ChannelFull,
    DuplicatePeerId,
}

impl From<AddPeerError> for ErrorCode {
    fn from(err: AddPeerError) -> Self {
        match err {
            AddPeerError::MaxChannelsReached => ErrorCode::MaxChannelsReached,
            AddPeerError::ChannelFull => ErrorCode::ChannelFull,
            AddPeerError::DuplicatePeerId => ErrorCode::DuplicatePeerId,
        }
    }
}

pub struct AddPeerOutcome {
    pub total_peers: usize,
    /// The other peer's summary, if one was already present — feeds the
    /// `ready` frame's `peer` field (spec.md §4.F).
    pub existing_peer: Option<PeerSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStatus {
    Sent,
    Queued,
    Dropped,
}

pub struct RelayOutcome {
    pub sent: bool,
    pub status: Option<RelayStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub channels: usize,
    pub total_peers: usize,
}

pub struct CloseAllOutcome {
    pub closed_count: usize,
    pub errors: Vec<String>,
}

/// Owns the `channelId → Channel` map under a single top-level mutex
/// (spec.md §5: "single mutex, or a per-channel mutex plus a top-level
/// mutex" — the single-mutex option, chosen for simplicity at
/// `MAX_CHANNELS` in the tens).
pub struct ChannelRegistry {
    channels: Mutex<HashMap<ChannelId, Channel>>,
    max_channels: usize,
    metrics: Arc<Metrics>,
}

impl ChannelRegistry {
    pub fn new(max_channels: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            max_channels,
            metrics,
        }
    }

    /// `addPeer` (spec.md §4.C). On success, also sends `peer(joined)` to
    /// the already-present side if the channel just reached two peers
    /// (the Open Question in §9 resolved toward asymmetric notification:
    /// only the existing peer is told; the newcomer learns of the existing
    /// peer via its own `ready` frame instead).
    pub async fn add_peer(
        &self,
        channel_id: &ChannelId,
        peer_id: PeerId,
        sink: Arc<dyn PeerSink>,
        client_info: Option<ClientInfo>,
    ) -> Result<AddPeerOutcome, AddPeerError> {
        let mut notify: Option<(Arc<dyn PeerSink>, String)> = None;
        let total_peers;
        let existing_peer;

        {
            let mut channels = self.channels.lock().await;

            if !channels.contains_key(channel_id) && channels.len() >= self.max_channels {
                return Err(AddPeerError::MaxChannelsReached);
            }
            let channel = channels.entry(channel_id.clone()).or_insert_with(Channel::new);

            if channel.peers.len() >= PEERS_PER_CHANNEL {
                return Err(AddPeerError::ChannelFull);
            }
            if channel.peers.contains_key(&peer_id) {
                return Err(AddPeerError::DuplicatePeerId);
            }

            existing_peer = channel.peers.values().next().map(|p| PeerSummary {
                peer_id: p.peer_id.as_str().to_string(),
                metadata: p.client_info.clone(),
            });

            channel.peers.insert(
                peer_id.clone(),
                Peer {
                    peer_id: peer_id.clone(),
                    sink,
                    connected_at: Utc::now(),
                    client_info: client_info.clone(),
                },
            );
            total_peers = channel.peers.len();

            if total_peers == PEERS_PER_CHANNEL {
                if let Some(existing) = channel
                    .peers
                    .values()
                    .find(|p| p.peer_id != peer_id)
                {
                    notify = Some((existing.sink.clone(), peer_joined_frame(&peer_id, client_info)));
                }
            }
        }

        if let Some((sink, frame)) = notify {
            sink.send_text(frame).await;
        }

        Ok(AddPeerOutcome {
            total_peers,
            existing_peer,
        })
    }

    /// `removePeer` (spec.md §4.C). The tombstone check (`Arc::ptr_eq`)
    /// guards against a failed duplicate-ID attempt's close event evicting
    /// the legitimate peer that already holds that id.
    pub async fn remove_peer(&self, channel_id: &ChannelId, peer_id: &PeerId, sink: &Arc<dyn PeerSink>) {
        let mut notify: Option<(Arc<dyn PeerSink>, String)> = None;
        let mut remove_channel = false;

        {
            let mut channels = self.channels.lock().await;
            let Some(channel) = channels.get_mut(channel_id) else {
                return;
            };
            let Some(stored) = channel.peers.get(peer_id) else {
                return;
            };
            if !Arc::ptr_eq(&stored.sink, sink) {
                return;
            }
            channel.peers.remove(peer_id);

            if channel.peers.len() == 1 {
                if let Some(survivor) = channel.peers.values().next() {
                    notify = Some((survivor.sink.clone(), peer_left_frame(peer_id)));
                }
            }
            if channel.peers.is_empty() {
                remove_channel = true;
            }
        }

        if remove_channel {
            self.channels.lock().await.remove(channel_id);
        }
        if let Some((sink, frame)) = notify {
            sink.send_text(frame).await;
        }
    }

    /// `getPeer`: the other peer in the channel, excluding `exclude_peer_id`.
    pub async fn get_peer(&self, channel_id: &ChannelId, exclude_peer_id: &PeerId) -> Option<PeerSummary> {
        let channels = self.channels.lock().await;
        let channel = channels.get(channel_id)?;
        channel
            .peers
            .values()
            .find(|p| &p.peer_id != exclude_peer_id)
            .map(|p| PeerSummary {
                peer_id: p.peer_id.as_str().to_string(),
                metadata: p.client_info.clone(),
            })
    }

    /// `hasPeer`.
    pub async fn has_peer(&self, channel_id: &ChannelId, exclude_peer_id: &PeerId) -> bool {
        self.get_peer(channel_id, exclude_peer_id).await.is_some()
    }

    /// `relayToPeer` (spec.md §4.C): locate the other peer, release the
    /// lock, send, then interpret the transport's tri-state result.
    /// Backpressure (`Queued`) never drops the connection.
    pub async fn relay_to_peer(&self, channel_id: &ChannelId, sender_id: &PeerId, raw_frame: &str) -> RelayOutcome {
        let target = {
            let channels = self.channels.lock().await;
            channels
                .get(channel_id)
                .and_then(|channel| channel.peers.values().find(|p| &p.peer_id != sender_id))
                .map(|p| p.sink.clone())
        };

        let Some(sink) = target else {
            return RelayOutcome {
                sent: false,
                status: None,
            };
        };

        match sink.send_text(raw_frame.to_string()).await {
            SendOutcome::Sent(bytes) => {
                self.metrics.record_relay(bytes);
                RelayOutcome {
                    sent: true,
                    status: Some(RelayStatus::Sent),
                }
            }
            SendOutcome::Queued => {
                self.metrics.record_relay(raw_frame.len());
                warn!(channel = %channel_id, "relay send backpressured, leaving connection open");
                RelayOutcome {
                    sent: true,
                    status: Some(RelayStatus::Queued),
                }
            }
            SendOutcome::Dropped => RelayOutcome {
                sent: false,
                status: Some(RelayStatus::Dropped),
            },
        }
    }

    /// `broadcastToAll`: fan out a raw frame to every connected peer across
    /// every channel. Used only by the `/admin/broadcast` ops route
    /// (`http::admin::broadcast`), never by the relay path itself — the
    /// relay pairs exactly two peers.
    pub async fn broadcast_to_all(&self, raw_frame: &str) -> usize {
        let targets: Vec<Arc<dyn PeerSink>> = {
            let channels = self.channels.lock().await;
            channels
                .values()
                .flat_map(|c| c.peers.values())
                .map(|p| p.sink.clone())
                .collect()
        };
        let mut delivered = 0;
        for sink in targets {
            if matches!(sink.send_text(raw_frame.to_string()).await, SendOutcome::Sent(_)) {
                delivered += 1;
            }
        }
        delivered
    }

    /// `closeAll`: used on shutdown. Collects every live socket under the
    /// lock, releases it, then closes each one outside the lock.
    pub async fn close_all(&self, code: u16, reason: &str) -> CloseAllOutcome {
        let targets: Vec<(ChannelId, PeerId, Arc<dyn PeerSink>)> = {
            let channels = self.channels.lock().await;
            channels
                .iter()
                .flat_map(|(channel_id, channel)| {
                    channel
                        .peers
                        .values()
                        .map(|p| (channel_id.clone(), p.peer_id.clone(), p.sink.clone()))
                        .collect::<Vec<_>>()
                })
                .collect()
        };

        let mut closed_count = 0;
        let mut errors = Vec::new();
        for (channel_id, peer_id, sink) in targets {
            if sink.close(code, reason.to_string()).await {
                closed_count += 1;
            } else {
                errors.push(format!("failed to close {channel_id}/{peer_id}"));
            }
        }
        CloseAllOutcome { closed_count, errors }
    }

    pub async fn get_stats(&self) -> RegistryStats {
        let channels = self.channels.lock().await;
        let total_peers = channels.values().map(|c| c.peers.len()).sum();
        RegistryStats {
            channels: channels.len(),
            total_peers,
        }
    }

    #[cfg(test)]
    pub async fn channel_count(&self) -> usize {
        self.channels.lock().await.len()
    }

    #[cfg(test)]
    pub async fn peer_count(&self, channel_id: &ChannelId) -> usize {
        self.channels
            .lock()
            .await
            .get(channel_id)
            .map(|c| c.peers.len())
            .unwrap_or(0)
    }
}
