// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-initiated ping.
//!
//! Every interval the connection is pinged unless its last pong is older than
//! `interval * max_ping_out`, in which case it is closed. Liveness is judged
//! by elapsed time, not by counting missed pings.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::Conn;

#[derive(Debug)]
pub(crate) struct Keepalive {
    last_pong: Mutex<Instant>,
}

impl Keepalive {
    pub(crate) fn new() -> Self {
        Self { last_pong: Mutex::new(Instant::now()) }
    }

    pub(crate) fn touch(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    pub(crate) fn since_last_pong(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    pub(crate) fn is_expired(&self, limit: Duration) -> bool {
        self.since_last_pong() > limit
    }
}

/// Start the ping timer for `conn`. No-op when keepalive is disabled.
pub(crate) fn spawn(conn: &Arc<Conn>) {
    let options = &conn.state.options;
    if !options.keepalive_enabled() {
        return;
    }
    let interval = options.ping_interval;
    let limit = options.liveness_limit();
    let cancel = conn.cancel.clone();
    let weak = Arc::downgrade(conn);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let Some(conn) = weak.upgrade() else { break };
            if conn.keepalive.is_expired(limit) {
                info!(
                    conn_id = %conn.id,
                    silent_ms = conn.keepalive.since_last_pong().as_millis() as u64,
                    "keepalive expired"
                );
                conn.close();
                break;
            }
            if let Err(code) = conn.ping() {
                debug!(conn_id = %conn.id, code = %code, "ping not queued");
            }
        }
    });
}
