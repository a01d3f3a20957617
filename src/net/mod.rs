//! Relay networking layer: channel/peer registry, connection state machine,
//! message pipeline, rate limiter, and the notification/transport layer
//! that sits between them and the host WS runtime.

pub mod connection;
pub mod message;
pub mod pipeline;
pub mod rate_limit;
pub mod registry;
pub mod relay;
pub mod transport;
pub mod types;

pub use connection::{ConnectionData, ConnectionPhase};
pub use message::{parse_and_validate, AckPayload, ContentType, DataPayload, Header, InboundMessage, MessageBody};
pub use pipeline::{Pipeline, PipelineAction};
pub use rate_limit::RateLimiter;
pub use registry::{AddPeerError, ChannelRegistry, RegistryStats, RelayStatus};
pub use relay::{error_frame, peer_joined_frame, peer_left_frame, ready_frame, PeerSummary};
pub use transport::{AxumPeerSink, PeerSink, SendOutcome};
pub use types::{ChannelId, ClientInfo, PeerId, PEERS_PER_CHANNEL};
