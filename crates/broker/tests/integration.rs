// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests over real TCP and WebSocket listeners.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpListener;

use fanout::config::BrokerOptions;
use fanout::packet::{Packet, TopicMessage};
use fanout::server::{serve_tcp, serve_ws};
use fanout::state::BrokerState;
use fanout::test_support::{test_options, test_state, wait_until, TestClient};

const WAIT: Duration = Duration::from_secs(2);

/// Both listeners on ephemeral ports; shut down on drop.
struct Broker {
    state: Arc<BrokerState>,
    tcp: SocketAddr,
    http: SocketAddr,
}

impl Broker {
    async fn start(options: BrokerOptions) -> anyhow::Result<Self> {
        let state = test_state(options);
        let tcp_listener = TcpListener::bind("127.0.0.1:0").await?;
        let http_listener = TcpListener::bind("127.0.0.1:0").await?;
        let tcp = tcp_listener.local_addr()?;
        let http = http_listener.local_addr()?;
        tokio::spawn(serve_tcp(tcp_listener, Arc::clone(&state)));
        tokio::spawn(serve_ws(http_listener, Arc::clone(&state)));
        Ok(Self { state, tcp, http })
    }

    async fn tcp_client(&self, password: &str) -> anyhow::Result<TestClient> {
        let mut client = TestClient::connect(self.tcp).await?;
        client.expect_connected().await?;
        let result = client.authorize(password).await?;
        anyhow::ensure!(result.authorized, "auth failed: {}", result.error);
        Ok(client)
    }

    async fn ws_client(&self, password: &str) -> anyhow::Result<TestClient> {
        let mut client = TestClient::connect_ws(self.http).await?;
        client.expect_connected().await?;
        let result = client.authorize(password).await?;
        anyhow::ensure!(result.authorized, "auth failed: {}", result.error);
        Ok(client)
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.state.shutdown.cancel();
    }
}

fn message(topic: &str, payload: &'static [u8]) -> TopicMessage {
    TopicMessage { topic: topic.to_owned(), payload: Bytes::from_static(payload) }
}

#[tokio::test]
async fn tcp_publish_fans_out_exactly_once() -> anyhow::Result<()> {
    let broker =
        Broker::start(BrokerOptions { password: Some("secret".to_owned()), ..test_options() }).await?;
    let mut alice = broker.tcp_client("secret").await?;
    let mut bob = broker.tcp_client("secret").await?;
    alice.subscribe("news").await?;
    bob.subscribe("news").await?;

    alice.publish("news", b"hello").await?;
    assert_eq!(alice.expect_message().await?, message("news", b"hello"));
    assert_eq!(bob.expect_message().await?, message("news", b"hello"));
    alice.expect_silence(Duration::from_millis(100)).await?;
    bob.expect_silence(Duration::from_millis(100)).await?;
    Ok(())
}

#[tokio::test]
async fn wrong_password_is_refused_then_timed_out() -> anyhow::Result<()> {
    let broker = Broker::start(BrokerOptions {
        password: Some("secret".to_owned()),
        auth_timeout: Duration::from_millis(300),
        ..test_options()
    })
    .await?;
    let mut mallory = TestClient::connect(broker.tcp).await?;
    mallory.expect_connected().await?;

    let result = mallory.authorize("guess").await?;
    assert!(!result.authorized);
    assert_eq!(result.error, "CREDENTIAL_INVALID");

    mallory.expect_closed().await?;
    assert!(broker.state.accounts.is_empty());
    wait_until(WAIT, || broker.state.connection_count() == 0).await?;
    Ok(())
}

#[tokio::test]
async fn websocket_publish_fans_out() -> anyhow::Result<()> {
    let broker = Broker::start(test_options()).await?;
    let mut alice = broker.ws_client("").await?;
    let mut bob = broker.ws_client("").await?;
    alice.subscribe("chat").await?;
    bob.subscribe("chat").await?;

    bob.publish("chat", b"hi").await?;
    assert_eq!(alice.expect_message().await?, message("chat", b"hi"));
    assert_eq!(bob.expect_message().await?, message("chat", b"hi"));
    Ok(())
}

#[tokio::test]
async fn transports_share_topics() -> anyhow::Result<()> {
    let broker = Broker::start(test_options()).await?;
    let mut tcp = broker.tcp_client("").await?;
    let mut ws = broker.ws_client("").await?;
    tcp.subscribe("mixed").await?;
    ws.subscribe("mixed").await?;

    tcp.publish("mixed", b"from tcp").await?;
    assert_eq!(ws.expect_message().await?, message("mixed", b"from tcp"));
    assert_eq!(tcp.expect_message().await?, message("mixed", b"from tcp"));

    ws.publish("mixed", b"from ws").await?;
    assert_eq!(tcp.expect_message().await?, message("mixed", b"from ws"));
    assert_eq!(ws.expect_message().await?, message("mixed", b"from ws"));
    Ok(())
}

#[tokio::test]
async fn messages_arrive_in_publish_order() -> anyhow::Result<()> {
    let broker = Broker::start(BrokerOptions { topic_queue: 64, ..test_options() }).await?;
    let mut publisher = broker.tcp_client("").await?;
    let mut reader = broker.ws_client("").await?;
    reader.subscribe("seq").await?;

    const PAYLOADS: [&[u8]; 5] = [b"0", b"1", b"2", b"3", b"4"];
    for payload in PAYLOADS {
        publisher.publish("seq", payload).await?;
    }
    for payload in PAYLOADS {
        assert_eq!(reader.expect_message().await?.payload, Bytes::from_static(payload));
    }
    Ok(())
}

#[tokio::test]
async fn websocket_keepalive_uses_native_pings() -> anyhow::Result<()> {
    let broker = Broker::start(BrokerOptions {
        ping_interval: Duration::from_millis(50),
        max_ping_out: 3,
        ..test_options()
    })
    .await?;
    let mut client = broker.ws_client("").await?;

    client.expect_silence(Duration::from_millis(400)).await?;
    assert!(client.pings_seen() >= 2, "saw {} pings", client.pings_seen());
    assert_eq!(broker.state.connection_count(), 1);
    Ok(())
}

#[tokio::test]
async fn closing_client_releases_account() -> anyhow::Result<()> {
    let broker = Broker::start(test_options()).await?;
    let mut ws = broker.ws_client("").await?;
    ws.subscribe("bye").await?;
    let tcp = broker.tcp_client("").await?;
    assert_eq!(broker.state.accounts.len(), 2);

    ws.close().await?;
    tcp.close().await?;
    wait_until(WAIT, || broker.state.connection_count() == 0).await?;
    assert!(broker.state.accounts.is_empty());
    let topic = broker.state.topics.get("bye").ok_or_else(|| anyhow::anyhow!("topic missing"))?;
    assert!(!topic.has_subscribers());
    Ok(())
}

#[tokio::test]
async fn oversized_websocket_message_closes_connection() -> anyhow::Result<()> {
    let broker = Broker::start(BrokerOptions { max_frame_len: 64, ..test_options() }).await?;
    let mut client = broker.ws_client("").await?;
    assert_eq!(broker.state.connection_count(), 1);

    client.send_frame(Bytes::from(vec![0x08; 1000])).await?;
    client.expect_closed().await?;
    wait_until(WAIT, || broker.state.connection_count() == 0).await?;
    assert!(broker.state.accounts.is_empty());
    Ok(())
}

#[tokio::test]
async fn ping_packet_round_trips_over_websocket() -> anyhow::Result<()> {
    let broker = Broker::start(test_options()).await?;
    let mut client = TestClient::connect_ws(broker.http).await?;
    client.expect_connected().await?;

    client.send(&Packet::Ping(fanout::packet::Heartbeat { timestamp_ms: 99 })).await?;
    assert_eq!(client.recv().await?, Packet::Pong(fanout::packet::Heartbeat { timestamp_ms: 99 }));
    Ok(())
}
