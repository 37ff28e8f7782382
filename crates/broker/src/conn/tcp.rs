// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Length-framed byte-stream transport.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};

use super::{Inbound, Outbound, Transport, TransportKind, TransportReader, TransportWriter};
use crate::framing::FrameCodec;
use crate::packet::{Heartbeat, Packet};

/// Any duplex byte stream carrying `[u32 len][packet]` frames.
pub struct TcpTransport<S> {
    stream: S,
    max_frame_len: usize,
}

impl<S> TcpTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    pub fn new(stream: S, max_frame_len: usize) -> Self {
        Self { stream, max_frame_len }
    }
}

impl TcpTransport<TcpStream> {
    pub fn from_stream(stream: TcpStream, max_frame_len: usize) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(err = %e, "set_nodelay failed");
        }
        Self::new(stream, max_frame_len)
    }
}

impl<S> Transport for TcpTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    type Reader = TcpReader<S>;
    type Writer = TcpWriter<S>;

    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn split(self) -> (TcpReader<S>, TcpWriter<S>) {
        let (read, write) = tokio::io::split(self.stream);
        (
            TcpReader { frames: FramedRead::new(read, FrameCodec::new(self.max_frame_len)) },
            TcpWriter { frames: FramedWrite::new(write, FrameCodec::new(self.max_frame_len)) },
        )
    }
}

pub struct TcpReader<S> {
    frames: FramedRead<ReadHalf<S>, FrameCodec>,
}

impl<S> TransportReader for TcpReader<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn recv(&mut self) -> Option<anyhow::Result<Inbound>> {
        let frame = self.frames.next().await?;
        Some(frame.map(Inbound::Frame).map_err(anyhow::Error::from))
    }
}

pub struct TcpWriter<S> {
    frames: FramedWrite<WriteHalf<S>, FrameCodec>,
}

impl<S> TransportWriter for TcpWriter<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn send(&mut self, item: Outbound) -> anyhow::Result<()> {
        let frame = match item {
            Outbound::Frame(frame) => frame,
            // Byte streams have no control frames; ping in-band.
            Outbound::Ping => Packet::Ping(Heartbeat::now()).encode()?,
        };
        self.frames.send(frame).await?;
        Ok(())
    }

    async fn shutdown(&mut self) {
        let _ = self.frames.close().await;
    }
}
