// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One client connection, independent of transport.
//!
//! [`Conn`] owns the outbound queue, the auth session, keepalive state and the
//! cancellation token. A [`Transport`] only moves frames: the TCP variant
//! adds length framing, the WebSocket variant maps one binary message to one
//! frame. Both run the same read path, write path and dispatch.

pub(crate) mod dispatch;
mod keepalive;
pub mod tcp;
pub mod ws;

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::account::FrameSink;
use crate::auth::{sha1_hex, AuthSession};
use crate::error::ErrorCode;
use crate::framing::FrameError;
use crate::packet::{Connected, Packet};
use crate::state::BrokerState;

use self::keepalive::Keepalive;

/// Bytes of payload granted one extra second of write deadline.
const WRITE_ALLOWANCE_BYTES: usize = 100 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    WebSocket,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::WebSocket => "ws",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entry on a connection's outbound queue.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// One encoded packet (`[opcode][body]`).
    Frame(Bytes),
    /// Transport-level keepalive probe.
    Ping,
}

impl Outbound {
    fn len(&self) -> usize {
        match self {
            Self::Frame(b) => b.len(),
            Self::Ping => 0,
        }
    }
}

/// What a transport hands to the read path.
#[derive(Debug, Clone)]
pub enum Inbound {
    Frame(Bytes),
    /// Transport-level keepalive answer.
    Pong,
}

/// Receiving half of a transport.
pub trait TransportReader: Send + 'static {
    /// Next inbound item. `None` means the peer closed cleanly.
    fn recv(&mut self) -> impl Future<Output = Option<anyhow::Result<Inbound>>> + Send;
}

/// Sending half of a transport.
pub trait TransportWriter: Send + 'static {
    fn send(&mut self, item: Outbound) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Flush and close the sending side. Errors are not interesting here.
    fn shutdown(&mut self) -> impl Future<Output = ()> + Send;
}

/// A physical transport that can be split into independent halves.
pub trait Transport: Send + 'static {
    type Reader: TransportReader;
    type Writer: TransportWriter;

    fn kind(&self) -> TransportKind;
    fn split(self) -> (Self::Reader, Self::Writer);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Open,
    Closing,
    Closed,
}

pub struct Conn {
    id: String,
    kind: TransportKind,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    state: Arc<BrokerState>,
    outbound: mpsc::Sender<Outbound>,
    outbound_rx: Mutex<Option<mpsc::Receiver<Outbound>>>,
    lifecycle: Mutex<Lifecycle>,
    cancel: CancellationToken,
    auth: AuthSession,
    keepalive: Keepalive,
}

impl Conn {
    pub fn new(
        state: Arc<BrokerState>,
        kind: TransportKind,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
    ) -> Arc<Self> {
        let seq = state.connection_opened();
        let id = connection_id(kind, local_addr, remote_addr, seq);
        let (outbound, rx) = mpsc::channel(state.options.conn_queue.max(1));
        let cancel = state.shutdown.child_token();
        let auth = AuthSession::new(&cancel);
        Arc::new(Self {
            id,
            kind,
            local_addr,
            remote_addr,
            state,
            outbound,
            outbound_rx: Mutex::new(Some(rx)),
            lifecycle: Mutex::new(Lifecycle::Open),
            cancel,
            auth,
            keepalive: Keepalive::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn state(&self) -> &Arc<BrokerState> {
        &self.state
    }

    pub fn is_authorized(&self) -> bool {
        self.auth.is_authorized()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock()
    }

    /// True once close has started or the broker is shutting down.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Begin servicing `transport`: announce the identity, start the read and
    /// write paths, the auth timeout and keepalive. Only the first call has
    /// any effect.
    pub fn accept<T: Transport>(self: &Arc<Self>, transport: T) {
        let Some(rx) = self.outbound_rx.lock().take() else {
            warn!(conn_id = %self.id, "connection already accepted");
            return;
        };
        debug_assert_eq!(transport.kind(), self.kind);
        let (reader, writer) = transport.split();

        info!(conn_id = %self.id, transport = %self.kind, remote = %self.remote_addr, "connection accepted");

        if let Err(code) = self.send_packet(&Packet::Connected(Connected { conn_id: self.id.clone() })) {
            debug!(conn_id = %self.id, code = %code, "connected notice not queued");
        }

        tokio::spawn(write_loop(Arc::clone(self), writer, rx));
        tokio::spawn(read_loop(Arc::clone(self), reader));

        let weak = Arc::downgrade(self);
        self.auth.spawn_timeout(self.state.options.auth_timeout, move || {
            let Some(conn) = weak.upgrade() else { return };
            if !conn.is_authorized() {
                info!(conn_id = %conn.id, remote = %conn.remote_addr, "auth timeout");
                conn.close();
            }
        });

        keepalive::spawn(self);
    }

    /// Enqueue one encoded packet. Never waits.
    pub fn write(&self, frame: Bytes) -> Result<(), ErrorCode> {
        self.enqueue(Outbound::Frame(frame))
    }

    pub fn send_packet(&self, packet: &Packet) -> Result<(), ErrorCode> {
        self.write(packet.encode()?)
    }

    /// Queue a transport-level ping.
    pub fn ping(&self) -> Result<(), ErrorCode> {
        self.enqueue(Outbound::Ping)
    }

    fn enqueue(&self, item: Outbound) -> Result<(), ErrorCode> {
        if self.is_closed() {
            return Err(ErrorCode::TransportClosed);
        }
        self.outbound.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ErrorCode::Backpressure,
            mpsc::error::TrySendError::Closed(_) => ErrorCode::TransportClosed,
        })
    }

    /// Tear the connection down. Safe from any task, any number of times;
    /// returns `true` only for the call that did the work.
    pub fn close(&self) -> bool {
        {
            let mut lifecycle = self.lifecycle.lock();
            if *lifecycle != Lifecycle::Open {
                return false;
            }
            *lifecycle = Lifecycle::Closing;
        }
        self.cancel.cancel();
        self.auth.cancel_timer();

        let had_account = self.state.accounts.remove(&self.id).is_some();
        self.state.connection_closed();
        *self.lifecycle.lock() = Lifecycle::Closed;

        info!(
            conn_id = %self.id,
            transport = %self.kind,
            remote = %self.remote_addr,
            authorized = had_account,
            "connection closed"
        );
        true
    }

    fn write_deadline(&self, item: &Outbound) -> Duration {
        let extra = (item.len() / WRITE_ALLOWANCE_BYTES) as u64;
        self.state.options.write_timeout + Duration::from_secs(extra)
    }
}

impl FrameSink for Conn {
    fn write(&self, frame: Bytes) -> Result<(), ErrorCode> {
        Conn::write(self, frame)
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("remote_addr", &self.remote_addr)
            .field("lifecycle", &self.lifecycle())
            .finish_non_exhaustive()
    }
}

/// Identity for a new connection; the sequence number keeps inputs distinct.
fn connection_id(kind: TransportKind, local: SocketAddr, remote: SocketAddr, seq: u64) -> String {
    let salt: u64 = rand::random();
    sha1_hex(format!("{kind}:{remote} <-> {kind}:{local}#{seq}:{salt:016x}").as_bytes())
}

async fn read_loop<R: TransportReader>(conn: Arc<Conn>, mut reader: R) {
    loop {
        let next = tokio::select! {
            _ = conn.cancel.cancelled() => break,
            next = reader.recv() => next,
        };
        match next {
            None => {
                debug!(conn_id = %conn.id, "peer closed");
                break;
            }
            Some(Err(e)) => {
                let code = e.downcast_ref::<FrameError>().map_or(ErrorCode::TransportClosed, FrameError::code);
                debug!(conn_id = %conn.id, code = %code, err = %format!("{e:#}"), "read failed");
                break;
            }
            Some(Ok(Inbound::Pong)) => conn.keepalive.touch(),
            Some(Ok(Inbound::Frame(frame))) => {
                if let Err(code) = dispatch::handle_frame(&conn, &frame) {
                    if code.closes_connection() {
                        warn!(conn_id = %conn.id, code = %code, "closing connection");
                        break;
                    }
                    debug!(conn_id = %conn.id, code = %code, "frame handling failed");
                }
            }
        }
    }
    conn.close();
}

async fn write_loop<W: TransportWriter>(conn: Arc<Conn>, mut writer: W, mut rx: mpsc::Receiver<Outbound>) {
    loop {
        let item = tokio::select! {
            _ = conn.cancel.cancelled() => break,
            item = rx.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };
        let deadline = conn.write_deadline(&item);
        match tokio::time::timeout(deadline, writer.send(item)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(conn_id = %conn.id, err = %format!("{e:#}"), "write failed");
                break;
            }
            Err(_) => {
                warn!(conn_id = %conn.id, deadline_ms = deadline.as_millis() as u64, "write deadline exceeded");
                break;
            }
        }
    }
    let _ = tokio::time::timeout(conn.state.options.write_timeout, writer.shutdown()).await;
    conn.close();
}

#[cfg(test)]
#[path = "conn_tests.rs"]
mod tests;
