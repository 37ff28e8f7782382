// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket transport: one binary message per frame, native ping/pong.

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::error::{CapacityError, Error as WsError};
use tracing::debug;

use super::{Inbound, Outbound, Transport, TransportKind, TransportReader, TransportWriter};
use crate::framing::FrameError;

pub struct WsTransport {
    socket: WebSocket,
    max_frame_len: usize,
}

impl WsTransport {
    /// `max_frame_len` should match the limit the upgrade was configured with.
    pub fn new(socket: WebSocket, max_frame_len: usize) -> Self {
        Self { socket, max_frame_len }
    }
}

impl Transport for WsTransport {
    type Reader = WsReader;
    type Writer = WsWriter;

    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    fn split(self) -> (WsReader, WsWriter) {
        let (sink, stream) = self.socket.split();
        (WsReader { stream, max_frame_len: self.max_frame_len }, WsWriter { sink })
    }
}

pub struct WsReader {
    stream: SplitStream<WebSocket>,
    max_frame_len: usize,
}

impl TransportReader for WsReader {
    async fn recv(&mut self) -> Option<anyhow::Result<Inbound>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(read_error(e))),
            };
            match msg {
                Message::Binary(frame) if frame.len() > self.max_frame_len => {
                    let err = FrameError::TooLarge { len: frame.len(), max: self.max_frame_len };
                    return Some(Err(err.into()));
                }
                Message::Binary(frame) => return Some(Ok(Inbound::Frame(frame))),
                Message::Pong(_) => return Some(Ok(Inbound::Pong)),
                Message::Close(_) => return None,
                Message::Ping(_) => continue,
                Message::Text(text) => {
                    debug!(len = text.len(), "text message ignored");
                    continue;
                }
            }
        }
    }
}

/// Surface tungstenite's size limit as [`FrameError::TooLarge`]; anything
/// else is a plain transport failure.
pub(crate) fn read_error(err: axum::Error) -> anyhow::Error {
    let too_long = std::iter::successors(Some(&err as &(dyn std::error::Error + 'static)), |e| e.source())
        .find_map(|e| match e.downcast_ref::<WsError>() {
            Some(WsError::Capacity(CapacityError::MessageTooLong { size, max_size })) => Some((*size, *max_size)),
            _ => None,
        });
    match too_long {
        Some((len, max)) => FrameError::TooLarge { len, max }.into(),
        None => err.into(),
    }
}

pub struct WsWriter {
    sink: SplitSink<WebSocket, Message>,
}

impl TransportWriter for WsWriter {
    async fn send(&mut self, item: Outbound) -> anyhow::Result<()> {
        let msg = match item {
            Outbound::Frame(frame) => Message::Binary(frame),
            Outbound::Ping => Message::Ping(Bytes::new()),
        };
        self.sink.send(msg).await?;
        Ok(())
    }

    async fn shutdown(&mut self) {
        let _ = self.sink.close().await;
    }
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
