// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes shared by the codec, connections, auth, and topic registry.
///
/// Every code is local to one connection or one publish call; none of them
/// is fatal to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Frame too short or body not decodable under its opcode's schema.
    MalformedFrame,
    /// Frame larger than the configured maximum.
    FrameTooLarge,
    /// Payload has no schema to serialize under.
    Serialization,
    CredentialMissing,
    CredentialInvalid,
    /// A bounded queue is full; the caller drops or retries.
    Backpressure,
    /// Transport is closed or errored.
    TransportClosed,
    InvalidTopic,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedFrame => "MALFORMED_FRAME",
            Self::FrameTooLarge => "FRAME_TOO_LARGE",
            Self::Serialization => "SERIALIZATION_ERROR",
            Self::CredentialMissing => "CREDENTIAL_MISSING",
            Self::CredentialInvalid => "CREDENTIAL_INVALID",
            Self::Backpressure => "BACKPRESSURE",
            Self::TransportClosed => "TRANSPORT_CLOSED",
            Self::InvalidTopic => "INVALID_TOPIC",
        }
    }

    /// Whether a connection that hit this code while reading must be torn down.
    pub fn closes_connection(&self) -> bool {
        matches!(self, Self::MalformedFrame | Self::FrameTooLarge | Self::TransportClosed)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for ErrorCode {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
