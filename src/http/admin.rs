//! `/health`, `/stats`, and `/admin/broadcast` (spec.md §6 "External HTTP
//! endpoints" plus the ambient ops surface SPEC_FULL.md §4.J adds). Consume
//! registry/metrics snapshots or, for broadcast, the registry's
//! `broadcastToAll` primitive directly; none of these touch a specific
//! channel's relay path.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::Serialize;
use subtle::ConstantTimeEq;

use crate::AppContext;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    timestamp: String,
}

pub async fn health() -> impl IntoResponse {
    Json(HealthBody {
        status: "ok",
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Constant-time Bearer check against `SERVER_SECRET`, shared by every
/// admin route.
fn authorized(ctx: &AppContext, headers: &HeaderMap) -> bool {
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    !presented.is_empty()
        && bool::from(presented.as_bytes().ct_eq(ctx.config.server_secret.as_bytes()))
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": "unauthorized"}))).into_response()
}

#[derive(Serialize)]
struct StatsBody {
    channels: usize,
    total_peers: usize,
    messages_relayed: u64,
    bytes_transferred: u64,
    connections_accepted: u64,
    connections_rejected: u64,
    errors: std::collections::HashMap<String, u64>,
}

/// Bearer-authed with the same `SERVER_SECRET` as the `/ws` upgrade.
pub async fn stats(State(ctx): State<Arc<AppContext>>, headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&ctx, &headers) {
        return unauthorized();
    }

    let registry_stats = ctx.registry.get_stats().await;
    let metrics_snapshot = ctx.metrics.snapshot().await;
    Json(StatsBody {
        channels: registry_stats.channels,
        total_peers: registry_stats.total_peers,
        messages_relayed: metrics_snapshot.messages_relayed,
        bytes_transferred: metrics_snapshot.bytes_transferred,
        connections_accepted: metrics_snapshot.connections_accepted,
        connections_rejected: metrics_snapshot.connections_rejected,
        errors: metrics_snapshot.errors,
    })
    .into_response()
}

#[derive(Serialize)]
struct BroadcastBody {
    delivered: usize,
}

/// Bearer-authed ops endpoint that fans a raw frame out to every connected
/// peer across every channel, bypassing the per-channel relay path
/// entirely. This is the one caller of [`crate::net::registry::ChannelRegistry::broadcast_to_all`]
/// — an operational announcement (e.g. a planned-maintenance notice), never
/// part of the two-peer relay protocol itself.
pub async fn broadcast(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    if !authorized(&ctx, &headers) {
        return unauthorized();
    }

    let delivered = ctx.registry.broadcast_to_all(&body).await;
    Json(BroadcastBody { delivered }).into_response()
}
