// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use super::{next_accept_delay, serve_tcp, serve_ws};
use crate::config::BrokerOptions;
use crate::test_support::{test_state, wait_until, TestClient};

#[yare::parameterized(
    first     = { 0, 5 },
    doubles   = { 5, 10 },
    grows     = { 320, 640 },
    capped    = { 640, 1000 },
    stays_max = { 1000, 1000 },
)]
fn accept_retry_backoff(prev_ms: u64, expected_ms: u64) {
    assert_eq!(next_accept_delay(Duration::from_millis(prev_ms)), Duration::from_millis(expected_ms));
}

#[tokio::test]
async fn tcp_listener_stops_on_shutdown() -> anyhow::Result<()> {
    let state = test_state(BrokerOptions::default());
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let task = tokio::spawn(serve_tcp(listener, Arc::clone(&state)));

    state.shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), task).await???;
    Ok(())
}

#[tokio::test]
async fn http_listener_stops_on_shutdown() -> anyhow::Result<()> {
    let state = test_state(BrokerOptions::default());
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let task = tokio::spawn(serve_ws(listener, Arc::clone(&state)));

    state.shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), task).await???;
    Ok(())
}

#[tokio::test]
async fn shutdown_closes_accepted_connections() -> anyhow::Result<()> {
    let state = test_state(BrokerOptions::default());
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let task = tokio::spawn(serve_tcp(listener, Arc::clone(&state)));

    let mut client = TestClient::connect(addr).await?;
    client.expect_connected().await?;
    assert_eq!(state.connection_count(), 1);

    state.shutdown.cancel();
    wait_until(Duration::from_secs(2), || state.connection_count() == 0).await?;
    client.expect_closed().await?;
    tokio::time::timeout(Duration::from_secs(2), task).await???;
    Ok(())
}
