// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport-independent packet codec.
//!
//! A packet is one opcode byte followed by a protobuf body whose schema is
//! selected by the opcode. TCP wraps packets in a length header (see
//! [`crate::framing`]); WebSocket carries one packet per binary message.

use bytes::{BufMut, Bytes, BytesMut};
use prost::Message as ProstMessage;

use crate::error::ErrorCode;

/// Shortest decodable packet: opcode plus at least one body byte.
pub const MIN_PACKET_LEN: usize = 2;

/// One-byte tag identifying a packet's body schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Unknown = 0x00,
    Ping = 0x01,
    Pong = 0x02,
    Connected = 0x03,
    Auth = 0x04,
    AuthResult = 0x05,
    Subscribe = 0x06,
    Unsubscribe = 0x07,
    Publish = 0x08,
    Message = 0x09,
    Error = 0x0a,
}

impl OpCode {
    pub fn from_u8(b: u8) -> Self {
        match b {
            0x01 => Self::Ping,
            0x02 => Self::Pong,
            0x03 => Self::Connected,
            0x04 => Self::Auth,
            0x05 => Self::AuthResult,
            0x06 => Self::Subscribe,
            0x07 => Self::Unsubscribe,
            0x08 => Self::Publish,
            0x09 => Self::Message,
            0x0a => Self::Error,
            _ => Self::Unknown,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Connected => "connected",
            Self::Auth => "auth",
            Self::AuthResult => "auth_result",
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Publish => "publish",
            Self::Message => "message",
            Self::Error => "error",
        }
    }
}

// -- Message bodies ----------------------------------------------------------

/// Body of `Ping` and `Pong`. A pong echoes the ping's timestamp.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Heartbeat {
    #[prost(uint64, tag = "1")]
    pub timestamp_ms: u64,
}

impl Heartbeat {
    pub fn now() -> Self {
        Self { timestamp_ms: epoch_ms() }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Connected {
    #[prost(string, tag = "1")]
    pub conn_id: String,
}

/// Client credential: lowercase SHA-1 hex of the server password.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AuthRequest {
    #[prost(string, tag = "1")]
    pub password: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AuthResult {
    #[prost(string, tag = "1")]
    pub conn_id: String,
    #[prost(bool, tag = "2")]
    pub authorized: bool,
    /// Error code string when `authorized` is false.
    #[prost(string, tag = "3")]
    pub error: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubscribeRequest {
    #[prost(string, tag = "1")]
    pub topic: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UnsubscribeRequest {
    #[prost(string, tag = "1")]
    pub topic: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PublishRequest {
    #[prost(string, tag = "1")]
    pub topic: String,
    #[prost(bytes = "bytes", tag = "2")]
    pub payload: Bytes,
}

/// A payload fanned out to the subscribers of `topic`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TopicMessage {
    #[prost(string, tag = "1")]
    pub topic: String,
    #[prost(bytes = "bytes", tag = "2")]
    pub payload: Bytes,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ErrorReply {
    #[prost(string, tag = "1")]
    pub code: String,
    #[prost(string, tag = "2")]
    pub message: String,
}

impl ErrorReply {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code: code.as_str().to_owned(), message: message.into() }
    }
}

// -- Packet ------------------------------------------------------------------

/// A decoded packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Unrecognized opcode; carries the raw byte.
    Unknown(u8),
    Ping(Heartbeat),
    Pong(Heartbeat),
    Connected(Connected),
    Auth(AuthRequest),
    AuthResult(AuthResult),
    Subscribe(SubscribeRequest),
    Unsubscribe(UnsubscribeRequest),
    Publish(PublishRequest),
    Message(TopicMessage),
    Error(ErrorReply),
}

impl Packet {
    pub fn op(&self) -> OpCode {
        match self {
            Self::Unknown(_) => OpCode::Unknown,
            Self::Ping(_) => OpCode::Ping,
            Self::Pong(_) => OpCode::Pong,
            Self::Connected(_) => OpCode::Connected,
            Self::Auth(_) => OpCode::Auth,
            Self::AuthResult(_) => OpCode::AuthResult,
            Self::Subscribe(_) => OpCode::Subscribe,
            Self::Unsubscribe(_) => OpCode::Unsubscribe,
            Self::Publish(_) => OpCode::Publish,
            Self::Message(_) => OpCode::Message,
            Self::Error(_) => OpCode::Error,
        }
    }

    /// Encode into `[opcode][body]`.
    ///
    /// `Unknown` has no schema and fails with [`ErrorCode::Serialization`].
    pub fn encode(&self) -> Result<Bytes, ErrorCode> {
        match self {
            Self::Unknown(_) => Err(ErrorCode::Serialization),
            Self::Ping(m) | Self::Pong(m) => encode(self.op(), m),
            Self::Connected(m) => encode(self.op(), m),
            Self::Auth(m) => encode(self.op(), m),
            Self::AuthResult(m) => encode(self.op(), m),
            Self::Subscribe(m) => encode(self.op(), m),
            Self::Unsubscribe(m) => encode(self.op(), m),
            Self::Publish(m) => encode(self.op(), m),
            Self::Message(m) => encode(self.op(), m),
            Self::Error(m) => encode(self.op(), m),
        }
    }
}

/// Encode one body under `op`.
pub fn encode<M: ProstMessage>(op: OpCode, msg: &M) -> Result<Bytes, ErrorCode> {
    if op == OpCode::Unknown {
        return Err(ErrorCode::Serialization);
    }
    let mut buf = BytesMut::with_capacity(1 + msg.encoded_len());
    buf.put_u8(op.as_u8());
    msg.encode(&mut buf).map_err(|_| ErrorCode::Serialization)?;
    Ok(buf.freeze())
}

/// Decode one packet.
///
/// Frames shorter than [`MIN_PACKET_LEN`] and bodies that do not parse under
/// their opcode's schema fail with [`ErrorCode::MalformedFrame`]. An
/// unrecognized opcode is not an error.
pub fn decode(frame: &[u8]) -> Result<Packet, ErrorCode> {
    if frame.len() < MIN_PACKET_LEN {
        return Err(ErrorCode::MalformedFrame);
    }
    let body = &frame[1..];
    let packet = match OpCode::from_u8(frame[0]) {
        OpCode::Unknown => Packet::Unknown(frame[0]),
        OpCode::Ping => Packet::Ping(body_of(body)?),
        OpCode::Pong => Packet::Pong(body_of(body)?),
        OpCode::Connected => Packet::Connected(body_of(body)?),
        OpCode::Auth => Packet::Auth(body_of(body)?),
        OpCode::AuthResult => Packet::AuthResult(body_of(body)?),
        OpCode::Subscribe => Packet::Subscribe(body_of(body)?),
        OpCode::Unsubscribe => Packet::Unsubscribe(body_of(body)?),
        OpCode::Publish => Packet::Publish(body_of(body)?),
        OpCode::Message => Packet::Message(body_of(body)?),
        OpCode::Error => Packet::Error(body_of(body)?),
    };
    Ok(packet)
}

fn body_of<M: ProstMessage + Default>(body: &[u8]) -> Result<M, ErrorCode> {
    M::decode(body).map_err(|_| ErrorCode::MalformedFrame)
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "packet_tests.rs"]
mod tests;
