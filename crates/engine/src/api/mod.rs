//! HTTP and WebSocket entry points.

pub mod connections;
pub mod websocket;

use std::sync::Arc;

use axum::{routing::get, Router};

pub use connections::{ConnectionInfo, ConnectionManager};
pub use websocket::{ws_handler, WsState};

use crate::app::App;

/// The service router: liveness plus the experience WebSocket.
pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws/experience", get(ws_handler))
        .with_state(Arc::new(WsState { app }))
}

async fn health_check() -> &'static str {
    "OK"
}
