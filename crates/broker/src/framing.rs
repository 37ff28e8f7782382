// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Length-delimited framing for the TCP transport.
//!
//! Each frame on the wire is a 4-byte big-endian length followed by that many
//! bytes of packet. [`FrameCodec`] reassembles frames from arbitrary read
//! splits: partial headers and partial payloads stay buffered until the rest
//! arrives, and one read may yield any number of frames.

use std::fmt;
use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ErrorCode;

/// Size of the length header preceding every frame.
pub const LENGTH_HEADER_LEN: usize = 4;

/// Default upper bound on a single frame (4 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// Framing failure.
#[derive(Debug)]
pub enum FrameError {
    Io(io::Error),
    TooLarge { len: usize, max: usize },
}

impl FrameError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Io(_) => ErrorCode::TransportClosed,
            Self::TooLarge { .. } => ErrorCode::FrameTooLarge,
        }
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "frame io: {e}"),
            Self::TooLarge { len, max } => write!(f, "frame too large: {len} bytes (max {max})"),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::TooLarge { .. } => None,
        }
    }
}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Length-prefix codec.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_len: usize,
    /// Declared length of the frame whose header has already been consumed.
    pending: Option<usize>,
}

impl FrameCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len, pending: None }
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        let len = match self.pending {
            Some(len) => len,
            None => {
                if src.len() < LENGTH_HEADER_LEN {
                    return Ok(None);
                }
                let len = src.get_u32() as usize;
                if len > self.max_frame_len {
                    return Err(FrameError::TooLarge { len, max: self.max_frame_len });
                }
                self.pending = Some(len);
                src.reserve(len.saturating_sub(src.len()));
                len
            }
        };

        if src.len() < len {
            return Ok(None);
        }
        self.pending = None;
        Ok(Some(src.split_to(len).freeze()))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), FrameError> {
        let len = item.len();
        if len > self.max_frame_len || len > u32::MAX as usize {
            return Err(FrameError::TooLarge { len, max: self.max_frame_len });
        }
        dst.reserve(LENGTH_HEADER_LEN + len);
        dst.put_u32(len as u32);
        dst.extend_from_slice(&item);
        Ok(())
    }
}

/// Prefix one packet with its length header.
pub fn frame(packet: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(LENGTH_HEADER_LEN + packet.len());
    buf.put_u32(packet.len() as u32);
    buf.extend_from_slice(packet);
    buf.freeze()
}

#[cfg(test)]
#[path = "framing_tests.rs"]
mod tests;
