// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fanout: pub/sub broker front end over TCP and WebSocket.

pub mod account;
pub mod auth;
pub mod config;
pub mod conn;
pub mod error;
pub mod framing;
pub mod packet;
pub mod registry;
pub mod server;
pub mod state;
pub mod test_support;
pub mod topic;
pub mod transport;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::server::{serve_tcp, serve_ws};
use crate::state::BrokerState;

/// Run the broker until Ctrl-C or a listener fails.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let state = BrokerState::new(config.options(), shutdown.clone());

    let tcp = match config.tcp_addr {
        Some(addr) => {
            Some(TcpListener::bind(addr).await.with_context(|| format!("binding tcp listener on {addr}"))?)
        }
        None => None,
    };
    let ws = match config.ws_addr {
        Some(addr) => {
            Some(TcpListener::bind(addr).await.with_context(|| format!("binding http listener on {addr}"))?)
        }
        None => None,
    };

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                shutdown.cancel();
            }
        });
    }

    let tcp_task = async {
        match tcp {
            Some(listener) => serve_tcp(listener, Arc::clone(&state)).await,
            None => Ok(()),
        }
    };
    let ws_task = async {
        match ws {
            Some(listener) => serve_ws(listener, Arc::clone(&state)).await,
            None => Ok(()),
        }
    };

    let result = tokio::try_join!(tcp_task, ws_task);
    shutdown.cancel();
    result?;
    info!("broker stopped");
    Ok(())
}
