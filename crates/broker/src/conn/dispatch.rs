// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-frame handling shared by every transport.

use std::sync::{Arc, Weak};

use tracing::{debug, info, trace, warn};

use crate::account::{Account, FrameSink};
use crate::auth::verify_credential;
use crate::error::ErrorCode;
use crate::packet::{
    self, AuthRequest, AuthResult, ErrorReply, OpCode, Packet, PublishRequest, TopicMessage,
};

use super::Conn;

/// Decode and act on one inbound frame.
///
/// An `Err` whose code closes connections ends the read path; any other `Err`
/// is only logged.
pub(crate) fn handle_frame(conn: &Arc<Conn>, frame: &[u8]) -> Result<(), ErrorCode> {
    let packet = packet::decode(frame)?;
    match packet {
        Packet::Ping(heartbeat) => conn.send_packet(&Packet::Pong(heartbeat)),
        Packet::Pong(_) => {
            conn.keepalive.touch();
            Ok(())
        }
        Packet::Auth(req) => handle_auth(conn, &req),
        other if !conn.is_authorized() => {
            trace!(conn_id = %conn.id, op = other.op().as_str(), "ignored before auth");
            Ok(())
        }
        Packet::Subscribe(req) => {
            let account = account_of(conn)?;
            match conn.state.topics.subscribe(&req.topic, &account) {
                Ok(added) => {
                    debug!(conn_id = %conn.id, topic = %req.topic, added, "subscribe");
                    Ok(())
                }
                Err(ErrorCode::TransportClosed) => Err(ErrorCode::TransportClosed),
                Err(code) => reply_error(conn, code, &req.topic),
            }
        }
        Packet::Unsubscribe(req) => {
            if req.topic.is_empty() {
                return reply_error(conn, ErrorCode::InvalidTopic, &req.topic);
            }
            let removed = conn.state.topics.unsubscribe(&req.topic, &conn.id);
            debug!(conn_id = %conn.id, topic = %req.topic, removed, "unsubscribe");
            Ok(())
        }
        Packet::Publish(req) => handle_publish(conn, req),
        Packet::Unknown(op) => {
            debug!(conn_id = %conn.id, op, "unknown opcode ignored");
            Ok(())
        }
        other => {
            debug!(conn_id = %conn.id, op = other.op().as_str(), "server-only opcode ignored");
            Ok(())
        }
    }
}

fn handle_auth(conn: &Arc<Conn>, req: &AuthRequest) -> Result<(), ErrorCode> {
    if conn.is_authorized() {
        return conn.send_packet(&auth_result(conn, Ok(())));
    }

    let verdict = verify_credential(conn.state.options.password.as_deref(), &req.password);
    match verdict {
        Ok(()) => {
            if conn.auth.authorize() {
                let sink: Weak<dyn FrameSink> = Arc::downgrade(conn) as Weak<dyn FrameSink>;
                conn.state.accounts.register(&conn.id, sink);
                // Close may have run between authorize and register.
                if conn.is_closed() {
                    conn.state.accounts.remove(&conn.id);
                    return Err(ErrorCode::TransportClosed);
                }
                info!(conn_id = %conn.id, remote = %conn.remote_addr, "authorized");
            }
        }
        Err(code) => {
            warn!(conn_id = %conn.id, remote = %conn.remote_addr, code = %code, "auth rejected");
        }
    }
    conn.send_packet(&auth_result(conn, verdict))
}

fn handle_publish(conn: &Arc<Conn>, req: PublishRequest) -> Result<(), ErrorCode> {
    if req.topic.is_empty() {
        return reply_error(conn, ErrorCode::InvalidTopic, &req.topic);
    }
    let message = TopicMessage { topic: req.topic, payload: req.payload };
    let frame = match packet::encode(OpCode::Message, &message) {
        Ok(frame) => frame,
        Err(code) => return reply_error(conn, code, &message.topic),
    };
    match conn.state.topics.publish(&message.topic, frame) {
        Ok(queued) => {
            trace!(conn_id = %conn.id, topic = %message.topic, bytes = message.payload.len(), queued, "publish");
            Ok(())
        }
        Err(code) => {
            debug!(conn_id = %conn.id, topic = %message.topic, code = %code, "publish rejected");
            reply_error(conn, code, &message.topic)
        }
    }
}

fn account_of(conn: &Conn) -> Result<Arc<Account>, ErrorCode> {
    conn.state.accounts.get(&conn.id).ok_or(ErrorCode::TransportClosed)
}

fn auth_result(conn: &Conn, verdict: Result<(), ErrorCode>) -> Packet {
    Packet::AuthResult(AuthResult {
        conn_id: conn.id.clone(),
        authorized: verdict.is_ok(),
        error: verdict.err().map(|c| c.as_str().to_owned()).unwrap_or_default(),
    })
}

fn reply_error(conn: &Conn, code: ErrorCode, topic: &str) -> Result<(), ErrorCode> {
    let message = if topic.is_empty() { "topic name is empty".to_owned() } else { format!("topic {topic}") };
    conn.send_packet(&Packet::Error(ErrorReply::new(code, message)))
}
