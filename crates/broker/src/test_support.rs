// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: clients, sinks, and state builders.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::account::{Account, FrameSink};
use crate::auth::hash_credential;
use crate::config::BrokerOptions;
use crate::conn::tcp::TcpTransport;
use crate::conn::{Conn, TransportKind};
use crate::error::ErrorCode;
use crate::framing::FrameCodec;
use crate::packet::{
    self, AuthRequest, AuthResult, Heartbeat, Packet, PublishRequest, SubscribeRequest, TopicMessage,
    UnsubscribeRequest,
};
use crate::state::BrokerState;

/// Default wait for anything a test expects to arrive.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Fresh broker state with its own shutdown token.
pub fn test_state(options: BrokerOptions) -> Arc<BrokerState> {
    BrokerState::new(options, CancellationToken::new())
}

/// Options tuned for tests: no keepalive unless asked, generous auth timeout.
pub fn test_options() -> BrokerOptions {
    BrokerOptions { ping_interval: Duration::ZERO, ..BrokerOptions::default() }
}

/// Accept a TCP-framed connection over an in-memory duplex pipe.
pub fn duplex_conn(state: &Arc<BrokerState>) -> (Arc<Conn>, TestClient) {
    let (server, client) = tokio::io::duplex(64 * 1024);
    let local: SocketAddr = ([127, 0, 0, 1], 7000).into();
    let remote: SocketAddr = ([127, 0, 0, 1], 50000).into();
    let conn = Conn::new(Arc::clone(state), TransportKind::Tcp, local, remote);
    conn.accept(TcpTransport::new(server, state.options.max_frame_len));
    (conn, TestClient::over(client))
}

/// Poll `cond` until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// In-memory [`FrameSink`] that records what it accepts.
pub struct RecordingSink {
    frames: Mutex<Vec<Bytes>>,
    capacity: usize,
    closed: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Self::with_capacity(usize::MAX)
    }

    /// Refuses with `Backpressure` once `capacity` frames are held.
    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self { frames: Mutex::new(Vec::new()), capacity, closed: AtomicBool::new(false) })
    }

    /// Refuse every later write with `TransportClosed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn frames(&self) -> Vec<Bytes> {
        self.frames.lock().clone()
    }

    pub fn weak(self: &Arc<Self>) -> Weak<dyn FrameSink> {
        let weak: Weak<dyn FrameSink> = Arc::downgrade(self) as Weak<dyn FrameSink>;
        weak
    }

    /// Wait until at least `n` frames arrived; returns all of them.
    pub async fn wait_for(&self, n: usize, timeout: Duration) -> anyhow::Result<Vec<Bytes>> {
        wait_until(timeout, || self.frames.lock().len() >= n)
            .await
            .with_context(|| format!("waiting for {n} frames, have {}", self.frames.lock().len()))?;
        Ok(self.frames())
    }
}

impl FrameSink for RecordingSink {
    fn write(&self, frame: Bytes) -> Result<(), ErrorCode> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ErrorCode::TransportClosed);
        }
        let mut frames = self.frames.lock();
        if frames.len() >= self.capacity {
            return Err(ErrorCode::Backpressure);
        }
        frames.push(frame);
        Ok(())
    }
}

/// An account writing into `sink`, not held by any registry.
pub fn account_for(id: &str, sink: &Arc<RecordingSink>) -> Arc<Account> {
    Account::new(id, sink.weak())
}

/// Byte stream a [`TestClient`] can frame.
pub trait TestIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> TestIo for T {}

enum Wire {
    Tcp(Framed<Box<dyn TestIo>, FrameCodec>),
    Ws(Box<WebSocketStream<MaybeTlsStream<TcpStream>>>),
}

/// Protocol-level client for either transport.
///
/// Server pings are answered automatically unless `auto_pong` is off.
pub struct TestClient {
    wire: Wire,
    auto_pong: bool,
    pings_seen: usize,
    sync_seq: u64,
}

impl TestClient {
    pub fn over(io: impl TestIo + 'static) -> Self {
        let io: Box<dyn TestIo> = Box::new(io);
        Self::with_wire(Wire::Tcp(Framed::new(io, FrameCodec::default())))
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.with_context(|| format!("connecting to {addr}"))?;
        Ok(Self::over(stream))
    }

    /// Connect to `ws://{addr}/ws`.
    pub async fn connect_ws(addr: SocketAddr) -> anyhow::Result<Self> {
        let url = format!("ws://{addr}/ws");
        let (ws, _resp) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .with_context(|| format!("connecting to {url}"))?;
        Ok(Self::with_wire(Wire::Ws(Box::new(ws))))
    }

    fn with_wire(wire: Wire) -> Self {
        Self { wire, auto_pong: true, pings_seen: 0, sync_seq: 0 }
    }

    pub fn set_auto_pong(&mut self, on: bool) {
        self.auto_pong = on;
    }

    /// Server pings observed so far (packet or WebSocket control frame).
    pub fn pings_seen(&self) -> usize {
        self.pings_seen
    }

    pub async fn send(&mut self, packet: &Packet) -> anyhow::Result<()> {
        self.send_frame(packet.encode()?).await
    }

    /// Send one already-encoded packet.
    pub async fn send_frame(&mut self, frame: Bytes) -> anyhow::Result<()> {
        match &mut self.wire {
            Wire::Tcp(framed) => framed.send(frame).await?,
            Wire::Ws(ws) => ws.send(tokio_tungstenite::tungstenite::Message::Binary(frame)).await?,
        }
        Ok(())
    }

    /// Write raw bytes beneath the framing layer (TCP only).
    pub async fn write_raw(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        match &mut self.wire {
            Wire::Tcp(framed) => {
                let io = framed.get_mut();
                io.write_all(bytes).await?;
                io.flush().await?;
                Ok(())
            }
            Wire::Ws(_) => anyhow::bail!("raw writes need a byte stream"),
        }
    }

    /// Next encoded packet; `None` once the server closed.
    async fn next_frame(&mut self) -> anyhow::Result<Option<Bytes>> {
        use tokio_tungstenite::tungstenite::Message;
        match &mut self.wire {
            Wire::Tcp(framed) => match framed.next().await {
                Some(frame) => Ok(Some(frame?)),
                None => Ok(None),
            },
            Wire::Ws(ws) => loop {
                match ws.next().await {
                    Some(Ok(Message::Binary(frame))) => return Ok(Some(frame)),
                    Some(Ok(Message::Ping(_))) => self.pings_seen += 1,
                    Some(Ok(Message::Close(_))) | None => return Ok(None),
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => return Ok(None),
                }
            },
        }
    }

    async fn recv_any(&mut self) -> anyhow::Result<Packet> {
        loop {
            let frame = self.next_frame().await?.context("connection closed")?;
            match packet::decode(&frame)? {
                Packet::Ping(heartbeat) if self.auto_pong => {
                    self.pings_seen += 1;
                    self.send(&Packet::Pong(heartbeat)).await?;
                }
                Packet::Ping(heartbeat) => {
                    self.pings_seen += 1;
                    return Ok(Packet::Ping(heartbeat));
                }
                other => return Ok(other),
            }
        }
    }

    /// Next packet other than an auto-answered ping.
    pub async fn recv(&mut self) -> anyhow::Result<Packet> {
        tokio::time::timeout(RECV_TIMEOUT, self.recv_any()).await.context("timed out waiting for packet")?
    }

    /// Assert nothing but pings arrives for `window`.
    pub async fn expect_silence(&mut self, window: Duration) -> anyhow::Result<()> {
        match tokio::time::timeout(window, self.recv_any()).await {
            Err(_) => Ok(()),
            Ok(Ok(packet)) => anyhow::bail!("unexpected {} packet", packet.op().as_str()),
            Ok(Err(e)) => Err(e),
        }
    }

    /// Wait for the server to close, discarding anything still in flight.
    pub async fn expect_closed(&mut self) -> anyhow::Result<()> {
        let wait = async {
            while self.next_frame().await.ok().flatten().is_some() {}
        };
        tokio::time::timeout(RECV_TIMEOUT, wait).await.context("connection still open")
    }

    pub async fn expect_connected(&mut self) -> anyhow::Result<String> {
        match self.recv().await? {
            Packet::Connected(c) => Ok(c.conn_id),
            other => anyhow::bail!("expected Connected, got {}", other.op().as_str()),
        }
    }

    /// Send the credential for `password` and return the server's verdict.
    pub async fn authorize(&mut self, password: &str) -> anyhow::Result<AuthResult> {
        self.send(&Packet::Auth(AuthRequest { password: hash_credential(password) })).await?;
        match self.recv().await? {
            Packet::AuthResult(result) => Ok(result),
            other => anyhow::bail!("expected AuthResult, got {}", other.op().as_str()),
        }
    }

    /// Round-trip a ping so every earlier request has been handled. Returns
    /// the packets that arrived first.
    pub async fn sync(&mut self) -> anyhow::Result<Vec<Packet>> {
        self.sync_seq += 1;
        let marker = Heartbeat { timestamp_ms: u64::MAX - self.sync_seq };
        self.send(&Packet::Ping(marker.clone())).await?;
        let mut before = Vec::new();
        loop {
            match self.recv().await? {
                Packet::Pong(hb) if hb == marker => return Ok(before),
                other => before.push(other),
            }
        }
    }

    pub async fn subscribe(&mut self, topic: &str) -> anyhow::Result<Vec<Packet>> {
        self.send(&Packet::Subscribe(SubscribeRequest { topic: topic.to_owned() })).await?;
        self.sync().await
    }

    pub async fn unsubscribe(&mut self, topic: &str) -> anyhow::Result<Vec<Packet>> {
        self.send(&Packet::Unsubscribe(UnsubscribeRequest { topic: topic.to_owned() })).await?;
        self.sync().await
    }

    pub async fn publish(&mut self, topic: &str, payload: &'static [u8]) -> anyhow::Result<()> {
        let req = PublishRequest { topic: topic.to_owned(), payload: Bytes::from_static(payload) };
        self.send(&Packet::Publish(req)).await
    }

    pub async fn expect_message(&mut self) -> anyhow::Result<TopicMessage> {
        match self.recv().await? {
            Packet::Message(msg) => Ok(msg),
            other => anyhow::bail!("expected Message, got {}", other.op().as_str()),
        }
    }

    pub async fn close(mut self) -> anyhow::Result<()> {
        match &mut self.wire {
            Wire::Tcp(framed) => framed.close().await?,
            Wire::Ws(ws) => (**ws).close(None).await?,
        }
        Ok(())
    }
}

/// Assert that `$expr` is an `Err` whose message contains `$substr`.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let msg = match $expr {
            Ok(_) => "<Ok>".to_owned(),
            Err(e) => e.to_string(),
        };
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
