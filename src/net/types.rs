//! Domain newtypes and shared constants for the relay: validated channel
//! and peer identifiers, plus the capacity/timing constants the rest of the
//! crate is built around.
//!
//! # Design Goals
//!
//! 1. **Bounded memory usage** — every collection the relay keeps has an
//!    explicit ceiling (`MAX_CHANNELS`, `PEERS_PER_CHANNEL`, `MAX_MESSAGE_SIZE`).
//!    A connected peer cannot grow server memory beyond these bounds.
//!
//! 2. **Fail closed** — admission and message validation reject anything that
//!    does not match the documented shape rather than guessing intent.
//!
//! # Memory Budget
//!
//! | Component            | Max size  | Calculation                          |
//! |-----------------------|-----------|--------------------------------------|
//! | Per-frame payload      | 100 MiB   | `MAX_MESSAGE_SIZE` default            |
//! | Channel registry       | small     | `MAX_CHANNELS` × `PEERS_PER_CHANNEL`  |
//! | Rate limiter entries   | transient | one `RateEntry` per distinct source IP within a window |

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorCode, RelayError};

// =============================================================================
// CHANNEL / PEER CAPACITY
// =============================================================================

/// Maximum live peers inside a single channel. The relay pairs exactly two
/// endpoints; a third admission attempt on a full channel is rejected.
pub const PEERS_PER_CHANNEL: usize = 2;

/// Default server-wide ceiling on simultaneously open channels.
pub const DEFAULT_MAX_CHANNELS: usize = 4;

/// Maximum length of a caller-chosen `peerId`, after trimming.
pub const MAX_PEER_ID_LEN: usize = 64;

// =============================================================================
// MESSAGE FRAMING
// =============================================================================

/// Default per-frame size cap (UTF-8 byte length of the raw text frame).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Allowed bounds for `IDLE_TIMEOUT_SEC`.
pub const IDLE_TIMEOUT_SEC_MIN: u64 = 60;
pub const IDLE_TIMEOUT_SEC_MAX: u64 = 120;
pub const DEFAULT_IDLE_TIMEOUT_SEC: u64 = 90;

// =============================================================================
// RATE LIMITING
// =============================================================================

/// Allowed bounds for `RATE_LIMIT_MAX`.
pub const RATE_LIMIT_MAX_MIN: u32 = 10;
pub const RATE_LIMIT_MAX_MAX: u32 = 100;
pub const DEFAULT_RATE_LIMIT_MAX: u32 = 30;

/// Default rate limiter window, in seconds.
pub const DEFAULT_RATE_LIMIT_WINDOW_SEC: u64 = 60;

/// Interval between rate limiter sweeps that evict expired entries.
pub const RATE_LIMIT_SWEEP_INTERVAL_SEC: u64 = 60;

// =============================================================================
// TRANSPORT ADAPTER
// =============================================================================

/// Upper bound on how long shutdown waits for in-flight connection tasks to
/// drain before force-exiting.
pub const SHUTDOWN_WATCHDOG_SEC: u64 = 10;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3000;

// =============================================================================
// VALIDATION PATTERNS
// =============================================================================

/// `channelId` must be exactly 8 alphanumeric characters.
static CHANNEL_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{8}$").expect("static regex is valid"));

/// 8-character alphanumeric channel identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        if CHANNEL_ID_RE.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(ErrorCode::InvalidChannel.into())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-chosen peer identifier, trimmed and bounded to
/// [`MAX_PEER_ID_LEN`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.chars().count() > MAX_PEER_ID_LEN {
            return Err(ErrorCode::InvalidPeerId.into());
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Arbitrary platform/version/key-value bag a peer may present at upgrade
/// time or via the connection's own metadata.
pub type ClientInfo = HashMap<String, Value>;
