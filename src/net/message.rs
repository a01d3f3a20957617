//! Wire envelope and per-type payload schemas. Each frame is tagged by
//! `header.type`; validation runs against `serde_json::Value` since the
//! wire format is JSON, not a length-prefixed binary frame.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ErrorCode, RelayError};
use crate::net::types::ClientInfo;

/// `header` object shared by every frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub timestamp: String,
}

impl Header {
    /// A fresh header for a server-originated frame: new UUID, current
    /// ISO-8601 timestamp.
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Raw shape every inbound frame must match before payload-specific
/// validation runs.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    header: RawHeader,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    #[serde(rename = "type")]
    kind: String,
    id: String,
    timestamp: String,
}

/// Validated payload for a `data` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPayload {
    #[serde(rename = "contentType")]
    pub content_type: ContentType,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ClientInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Binary,
}

/// Validated payload for an `ack` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckPayload {
    #[serde(rename = "messageId")]
    pub message_id: String,
    pub status: AckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ClientInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Success,
    Error,
}

/// Validated payload for a `control` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPayload {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ClientInfo>,
}

/// A fully validated inbound frame, still holding the original raw text so
/// the relay forwards it byte-identical instead of re-serializing it.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub header: Header,
    pub body: MessageBody,
    pub raw: String,
}

#[derive(Debug, Clone)]
pub enum MessageBody {
    Data(DataPayload),
    Ack(AckPayload),
    Control(ControlPayload),
}

impl InboundMessage {
    /// `messageId` to cite in an `error` frame when validation fails after
    /// the header itself parsed, for an `error` frame's optional `messageId`.
    pub fn id(&self) -> &str {
        &self.header.id
    }
}

/// Runs the pipeline's parse + schema-validation steps 2-4 (size gating is
/// the caller's job, done on the raw byte length before this is called).
pub fn parse_and_validate(raw: &str) -> Result<InboundMessage, RelayError> {
    let envelope: RawEnvelope = serde_json::from_str(raw)
        .map_err(|_| RelayError::from(ErrorCode::InvalidMessage))?;

    validate_uuid(&envelope.header.id)?;
    validate_timestamp(&envelope.header.timestamp)?;

    let body = match envelope.header.kind.as_str() {
        "data" => MessageBody::Data(validate_data_payload(&envelope.payload)?),
        "ack" => MessageBody::Ack(validate_ack_payload(&envelope.payload)?),
        "control" => MessageBody::Control(validate_control_payload(&envelope.payload)?),
        _ => return Err(ErrorCode::InvalidMessage.into()),
    };

    Ok(InboundMessage {
        header: Header {
            kind: envelope.header.kind,
            id: envelope.header.id,
            timestamp: envelope.header.timestamp,
        },
        body,
        raw: raw.to_string(),
    })
}

fn validate_uuid(id: &str) -> Result<(), RelayError> {
    Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| ErrorCode::InvalidMessage.into())
}

fn validate_timestamp(timestamp: &str) -> Result<(), RelayError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|_| ())
        .map_err(|_| ErrorCode::InvalidMessage.into())
}

fn validate_data_payload(value: &Value) -> Result<DataPayload, RelayError> {
    let payload: DataPayload =
        serde_json::from_value(value.clone()).map_err(|_| ErrorCode::InvalidMessage)?;
    if payload.data.is_empty() {
        return Err(ErrorCode::InvalidMessage.into());
    }
    if payload.content_type == ContentType::Binary && BASE64.decode(&payload.data).is_err() {
        return Err(ErrorCode::InvalidMessage.into());
    }
    Ok(payload)
}

fn validate_ack_payload(value: &Value) -> Result<AckPayload, RelayError> {
    let payload: AckPayload =
        serde_json::from_value(value.clone()).map_err(|_| ErrorCode::InvalidMessage)?;
    validate_uuid(&payload.message_id)?;
    Ok(payload)
}

fn validate_control_payload(value: &Value) -> Result<ControlPayload, RelayError> {
    let payload: ControlPayload =
        serde_json::from_value(value.clone()).map_err(|_| ErrorCode::InvalidMessage)?;
    if payload.command.is_empty() {
        return Err(ErrorCode::InvalidMessage.into());
    }
    Ok(payload)
}
