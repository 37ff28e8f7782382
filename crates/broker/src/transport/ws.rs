// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::IntoResponse;

use super::HttpState;
use crate::conn::ws::WsTransport;
use crate::conn::{Conn, TransportKind};

/// `GET /ws`: upgrade and hand the socket to a new connection.
///
/// Auth happens in-band after the upgrade, same as TCP.
pub async fn ws_handler(
    State(state): State<Arc<HttpState>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let max = state.broker.options.max_frame_len;
    ws.max_message_size(max).max_frame_size(max).on_upgrade(move |socket| async move {
        let conn = Conn::new(Arc::clone(&state.broker), TransportKind::WebSocket, state.local_addr, remote);
        conn.accept(WsTransport::new(socket, max));
    })
}
