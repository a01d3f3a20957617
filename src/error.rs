//! Wire error catalog and the `RelayError` type that carries it through the
//! admission path (as an HTTP response) and the in-session path (as a
//! server-originated `error` frame).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// One row of the error catalog: a stable wire code, the close code sent to
/// the client socket, the HTTP status used when the failure happens before
/// upgrade, and whether the connection may stay open afterward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidMessage,
    MessageTooLarge,
    NoPeerConnected,
    InvalidSecret,
    InvalidChannel,
    InvalidPeerId,
    ChannelFull,
    DuplicatePeerId,
    RateLimitExceeded,
    MaxChannelsReached,
    InternalError,
    UpgradeFailed,
}

impl ErrorCode {
    /// Stable wire identifier sent in `payload.code` and counted in metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidMessage => "INVALID_MESSAGE",
            Self::MessageTooLarge => "MESSAGE_TOO_LARGE",
            Self::NoPeerConnected => "NO_PEER_CONNECTED",
            Self::InvalidSecret => "INVALID_SECRET",
            Self::InvalidChannel => "INVALID_CHANNEL",
            Self::InvalidPeerId => "INVALID_PEER_ID",
            Self::ChannelFull => "CHANNEL_FULL",
            Self::DuplicatePeerId => "DUPLICATE_PEER_ID",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::MaxChannelsReached => "MAX_CHANNELS_REACHED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::UpgradeFailed => "UPGRADE_FAILED",
        }
    }

    /// WebSocket close code in the 4xxx application range.
    pub fn close_code(self) -> u16 {
        match self {
            Self::InvalidMessage => 4001,
            Self::MessageTooLarge => 4002,
            Self::NoPeerConnected => 4003,
            Self::InvalidSecret => 4100,
            Self::InvalidChannel => 4101,
            Self::InvalidPeerId => 4102,
            Self::ChannelFull => 4200,
            Self::DuplicatePeerId => 4201,
            Self::RateLimitExceeded => 4202,
            Self::MaxChannelsReached => 4203,
            Self::InternalError | Self::UpgradeFailed => 4900,
        }
    }

    /// HTTP status used for a pre-upgrade rejection.
    pub fn http_status(self) -> StatusCode {
        match self {
            Self::InvalidMessage | Self::MessageTooLarge | Self::NoPeerConnected => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidSecret => StatusCode::UNAUTHORIZED,
            Self::InvalidChannel | Self::InvalidPeerId => StatusCode::BAD_REQUEST,
            Self::ChannelFull => StatusCode::SERVICE_UNAVAILABLE,
            Self::DuplicatePeerId => StatusCode::CONFLICT,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::MaxChannelsReached => StatusCode::SERVICE_UNAVAILABLE,
            Self::InternalError | Self::UpgradeFailed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the socket may stay open after this error is reported. Only
    /// the validation-level errors are recoverable.
    pub fn recoverable(self) -> bool {
        matches!(
            self,
            Self::InvalidMessage | Self::MessageTooLarge | Self::NoPeerConnected
        )
    }
}

/// Error raised anywhere in the admission or relay path. Carries the catalog
/// code plus optional human-readable context that never leaks past the
/// `message` field of the wire/HTTP response.
#[derive(Debug, Error)]
#[error("{code}: {detail}", code = .code.as_str())]
pub struct RelayError {
    pub code: ErrorCode,
    pub detail: String,
}

impl RelayError {
    pub fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

impl From<ErrorCode> for RelayError {
    fn from(code: ErrorCode) -> Self {
        Self {
            detail: default_message(code).to_string(),
            code,
        }
    }
}

fn default_message(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::InvalidMessage => "malformed or unrecognized message",
        ErrorCode::MessageTooLarge => "message exceeds the configured size limit",
        ErrorCode::NoPeerConnected => "no peer connected to relay to",
        ErrorCode::InvalidSecret => "missing or incorrect secret",
        ErrorCode::InvalidChannel => "channelId must be 8 alphanumeric characters",
        ErrorCode::InvalidPeerId => "peerId must be 1-64 characters after trimming",
        ErrorCode::ChannelFull => "channel already has two peers",
        ErrorCode::DuplicatePeerId => "peerId already in use in this channel",
        ErrorCode::RateLimitExceeded => "too many connection attempts from this address",
        ErrorCode::MaxChannelsReached => "server-wide channel limit reached",
        ErrorCode::InternalError => "internal error",
        ErrorCode::UpgradeFailed => "websocket upgrade failed",
    }
}

#[derive(Serialize)]
struct AdmissionBody {
    code: &'static str,
    status: u16,
    message: String,
}

/// Admission-time errors are surfaced as a plain JSON HTTP response,
/// never as a websocket frame, since the upgrade never completed.
impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.code.http_status();
        let body = AdmissionBody {
            code: self.code.as_str(),
            status: status.as_u16(),
            message: self.detail,
        };
        (status, axum::Json(body)).into_response()
    }
}
