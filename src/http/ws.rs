//! The `/ws` route: axum upgrade handling plus the per-connection task that
//! drives a single socket through its admitted → ready → closing lifecycle
//! (spec.md §4.D). This is the "host WS runtime" spec.md §1 treats as an
//! external collaborator, made concrete here on top of `axum`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use tracing::{debug, info};

use crate::error::ErrorCode;
use crate::http::upgrade::admit;
use crate::net::connection::ConnectionData;
use crate::net::pipeline::{Pipeline, PipelineAction};
use crate::net::relay::{error_frame, ready_frame};
use crate::net::transport::AxumPeerSink;
use crate::AppContext;

pub async fn ws_handler(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match admit(&ctx, addr.ip(), &query, auth_header).await {
        Ok(params) => {
            ctx.metrics.record_connection_accepted();
            ws.max_message_size(ctx.config.max_message_size)
                .on_upgrade(move |socket| async move {
                    // Spawned explicitly (rather than awaited inline) so a panic
                    // inside one connection's handling is caught here instead of
                    // taking down the task axum itself drives the upgrade future
                    // from.
                    let task_ctx = ctx.clone();
                    let handle = tokio::spawn(handle_socket(
                        ctx,
                        socket,
                        params.channel_id,
                        params.peer_id,
                    ));
                    if let Err(join_err) = handle.await {
                        if join_err.is_panic() {
                            tracing::error!("connection task panicked: {join_err}");
                            task_ctx.metrics.record_error(ErrorCode::InternalError).await;
                        }
                    }
                })
        }
        Err(err) => {
            ctx.metrics.record_connection_rejected();
            err.into_response()
        }
    }
}

async fn handle_socket(
    ctx: Arc<AppContext>,
    socket: WebSocket,
    channel_id: crate::net::types::ChannelId,
    peer_id: crate::net::types::PeerId,
) {
    let (sink_half, mut stream) = socket.split();
    let sink: Arc<dyn crate::net::transport::PeerSink> = AxumPeerSink::new(sink_half);
    let mut conn = ConnectionData::new(channel_id.clone(), peer_id.clone(), None);

    // Step 6 of the upgrade gate (spec.md §4.A) plus the `admitted` phase's
    // `open` transition (spec.md §4.D): add the peer to the registry and
    // emit `ready`, or reject with the catalog close code.
    let add_result = ctx
        .registry
        .add_peer(&channel_id, peer_id.clone(), sink.clone(), conn.client_info.clone())
        .await;

    let existing_peer = match add_result {
        Ok(outcome) => outcome.existing_peer,
        Err(add_err) => {
            let code: ErrorCode = add_err.into();
            ctx.metrics.record_error(code).await;
            let frame = error_frame(code, default_message(code), None);
            sink.send_text(frame).await;
            sink.close(code.close_code(), default_message(code).to_string()).await;
            return;
        }
    };

    let ready = ready_frame(&peer_id, channel_id.as_str(), existing_peer);
    sink.send_text(ready).await;
    conn.mark_ready();

    let pipeline = Pipeline::new(&ctx.registry, &ctx.metrics, ctx.config.max_message_size);
    let idle_timeout = std::time::Duration::from_secs(ctx.config.idle_timeout_sec);

    loop {
        let next = tokio::time::timeout(idle_timeout, stream.next()).await;
        let frame = match next {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(_))) | Ok(None) => break,
            Err(_) => {
                debug!(peer = %peer_id, channel = %channel_id, "idle timeout");
                break;
            }
        };

        match frame {
            WsMessage::Text(text) => {
                let action = pipeline.process(&channel_id, &peer_id, text.as_str()).await;
                if let PipelineAction::Error {
                    code,
                    message,
                    message_id,
                    close,
                } = action
                {
                    let frame = error_frame(code, &message, message_id.as_deref());
                    sink.send_text(frame).await;
                    if close {
                        sink.close(code.close_code(), message).await;
                        break;
                    }
                }
            }
            WsMessage::Close(_) => break,
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Binary(_) => {}
        }
    }

    conn.mark_closing();
    ctx.registry.remove_peer(&channel_id, &peer_id, &sink).await;
    info!(peer = %peer_id, channel = %channel_id, "connection closed");
}

fn default_message(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::ChannelFull => "channel already has two peers",
        ErrorCode::DuplicatePeerId => "peerId already in use in this channel",
        ErrorCode::MaxChannelsReached => "server-wide channel limit reached",
        _ => "rejected",
    }
}
