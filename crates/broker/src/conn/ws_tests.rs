// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tokio_tungstenite::tungstenite::error::{CapacityError, Error as WsError};

use super::read_error;
use crate::error::ErrorCode;
use crate::framing::FrameError;

fn code_of(err: &anyhow::Error) -> ErrorCode {
    err.downcast_ref::<FrameError>().map_or(ErrorCode::TransportClosed, FrameError::code)
}

#[test]
fn message_over_limit_is_frame_too_large() -> anyhow::Result<()> {
    let limit = WsError::Capacity(CapacityError::MessageTooLong { size: 1000, max_size: 64 });
    let err = read_error(axum::Error::new(limit));

    assert_eq!(code_of(&err), ErrorCode::FrameTooLarge);
    match err.downcast_ref::<FrameError>() {
        Some(FrameError::TooLarge { len, max }) => assert_eq!((*len, *max), (1000, 64)),
        other => anyhow::bail!("expected TooLarge, got {other:?}"),
    }
    Ok(())
}

#[yare::parameterized(
    closed     = { WsError::ConnectionClosed },
    io         = { WsError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset)) },
    too_many   = { WsError::Capacity(CapacityError::TooManyHeaders) },
)]
fn other_errors_are_transport_closed(inner: WsError) {
    let err = read_error(axum::Error::new(inner));
    assert_eq!(code_of(&err), ErrorCode::TransportClosed);
}
