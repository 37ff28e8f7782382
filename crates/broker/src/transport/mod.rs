// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface: WebSocket upgrade and health.

pub mod http;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::BrokerState;

/// Router state: the broker plus the address the HTTP listener is bound to.
pub struct HttpState {
    pub broker: Arc<BrokerState>,
    pub local_addr: SocketAddr,
}

/// Build the axum `Router` with all broker routes.
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // WebSocket clients
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
