//! Upgrade Gate (spec.md §4.A): rate-limit, parse params, authenticate,
//! admit or reject — steps 1-5. The actual socket upgrade (step 6) is
//! axum's `WebSocketUpgrade::on_upgrade`, driven from `http::ws`.
//!
//! Grounded on the teacher's defensive, early-return validation style
//! (`net/types.rs`'s `is_valid_channel_id`/`is_valid_peer_id`, reused
//! directly) plus a constant-time secret compare — new here, since the
//! teacher's only secret comparison is a cryptographic signature check, not
//! a shared-secret compare. `subtle` is the crate the wider ecosystem uses
//! for this and is not something the teacher itself needed.

use std::collections::HashMap;
use std::net::IpAddr;

use subtle::ConstantTimeEq;

use crate::error::{ErrorCode, RelayError};
use crate::net::types::{ChannelId, PeerId};
use crate::AppContext;

pub struct AdmittedParams {
    pub channel_id: ChannelId,
    pub peer_id: PeerId,
}

/// Runs steps 1-5 of spec.md §4.A. `auth_header` is the raw
/// `Authorization` header value, if present.
pub async fn admit(
    ctx: &AppContext,
    source_ip: IpAddr,
    query: &HashMap<String, String>,
    auth_header: Option<&str>,
) -> Result<AdmittedParams, RelayError> {
    if !ctx.rate_limiter.check(source_ip).await {
        ctx.metrics.record_error(ErrorCode::RateLimitExceeded).await;
        return Err(ErrorCode::RateLimitExceeded.into());
    }

    let channel_id_raw = query.get("channelId").map(String::as_str).unwrap_or("");
    let peer_id_raw = query.get("peerId").map(String::as_str).unwrap_or("");
    let secret = extract_secret(query, auth_header);

    let channel_id = match ChannelId::parse(channel_id_raw) {
        Ok(channel_id) => channel_id,
        Err(e) => {
            ctx.metrics.record_error(e.code).await;
            return Err(e);
        }
    };
    let peer_id = match PeerId::parse(peer_id_raw) {
        Ok(peer_id) => peer_id,
        Err(e) => {
            ctx.metrics.record_error(e.code).await;
            return Err(e);
        }
    };

    if secret.is_empty() || !bool::from(secret.as_bytes().ct_eq(ctx.config.server_secret.as_bytes())) {
        ctx.metrics.record_error(ErrorCode::InvalidSecret).await;
        return Err(ErrorCode::InvalidSecret.into());
    }

    Ok(AdmittedParams { channel_id, peer_id })
}

/// `Authorization: Bearer <secret>` takes priority over `?secret=`
/// (spec.md §4.A step 2, §6).
fn extract_secret(query: &HashMap<String, String>, auth_header: Option<&str>) -> String {
    if let Some(header) = auth_header {
        if let Some(token) = header.strip_prefix("Bearer ") {
            return token.to_string();
        }
    }
    query.get("secret").cloned().unwrap_or_default()
}
