//! Admin HTTP + Transport Adapter (spec.md's ambient §4.I/§4.J): the axum
//! router binding `/ws`, `/health`, `/stats` to one shared `AppContext`.

pub mod admin;
pub mod upgrade;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::AppContext;

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(admin::health))
        .route("/stats", get(admin::stats))
        .route("/admin/broadcast", post(admin::broadcast))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
