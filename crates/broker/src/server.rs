// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listeners: accept transports, wrap each in a [`Conn`], start it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::conn::tcp::TcpTransport;
use crate::conn::{Conn, TransportKind};
use crate::state::BrokerState;
use crate::transport::{build_router, HttpState};

const ACCEPT_RETRY_MIN: Duration = Duration::from_millis(5);
const ACCEPT_RETRY_MAX: Duration = Duration::from_secs(1);

/// Delay before retrying after a failed accept.
pub(crate) fn next_accept_delay(prev: Duration) -> Duration {
    if prev.is_zero() {
        ACCEPT_RETRY_MIN
    } else {
        (prev * 2).min(ACCEPT_RETRY_MAX)
    }
}

/// Accept TCP clients until shutdown.
pub async fn serve_tcp(listener: TcpListener, state: Arc<BrokerState>) -> anyhow::Result<()> {
    let local_addr = listener.local_addr().context("reading tcp listener address")?;
    info!(addr = %local_addr, "tcp listening");

    let mut delay = Duration::ZERO;
    loop {
        let accepted = tokio::select! {
            _ = state.shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, remote_addr)) => {
                delay = Duration::ZERO;
                let conn = Conn::new(Arc::clone(&state), TransportKind::Tcp, local_addr, remote_addr);
                conn.accept(TcpTransport::from_stream(stream, state.options.max_frame_len));
            }
            Err(e) => {
                delay = next_accept_delay(delay);
                warn!(err = %e, retry_ms = delay.as_millis() as u64, "accept failed");
                tokio::select! {
                    _ = state.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    info!(addr = %local_addr, "tcp listener stopped");
    Ok(())
}

/// Serve the HTTP router (WebSocket upgrade + health) until shutdown.
pub async fn serve_ws(listener: TcpListener, state: Arc<BrokerState>) -> anyhow::Result<()> {
    let local_addr = listener.local_addr().context("reading http listener address")?;
    let shutdown = state.shutdown.clone();
    let router = build_router(Arc::new(HttpState { broker: state, local_addr }));
    info!(addr = %local_addr, "http listening");

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("http server")?;

    info!(addr = %local_addr, "http listener stopped");
    Ok(())
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
