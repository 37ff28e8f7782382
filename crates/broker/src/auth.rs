// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection authentication handshake.
//!
//! Clients send the SHA-1 hex of the server password, never the password
//! itself. A session starts unauthenticated with a one-shot timeout; it moves
//! to authorized at most once and never back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sha1::{Digest, Sha1};
use tokio_util::sync::CancellationToken;

use crate::error::ErrorCode;

/// Lowercase hex SHA-1 of `data`.
pub fn sha1_hex(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

/// The credential a client sends for `password`.
pub fn hash_credential(password: &str) -> String {
    sha1_hex(password.as_bytes())
}

/// Equal-length ASCII comparison, case-insensitive, in time independent of
/// where the first mismatch falls.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x.to_ascii_lowercase() ^ y.to_ascii_lowercase();
    }
    acc == 0
}

/// Check a client credential against the configured password.
///
/// No password (or an empty one) means open mode: everything passes.
pub fn verify_credential(password: Option<&str>, credential: &str) -> Result<(), ErrorCode> {
    let password = match password {
        Some(p) if !p.is_empty() => p,
        _ => return Ok(()),
    };
    if credential.is_empty() {
        return Err(ErrorCode::CredentialMissing);
    }
    if constant_time_eq(&hash_credential(password), credential) {
        Ok(())
    } else {
        Err(ErrorCode::CredentialInvalid)
    }
}

/// Handshake state owned by one connection.
#[derive(Debug)]
pub struct AuthSession {
    authorized: AtomicBool,
    timer: CancellationToken,
}

impl AuthSession {
    /// `parent` is the connection's cancellation token; cancelling it also
    /// cancels the pending timeout.
    pub fn new(parent: &CancellationToken) -> Self {
        Self { authorized: AtomicBool::new(false), timer: parent.child_token() }
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::Acquire)
    }

    /// Move to authorized. Returns `true` only for the call that made the
    /// transition; the timeout is cancelled either way.
    pub fn authorize(&self) -> bool {
        let transitioned = self
            .authorized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        self.timer.cancel();
        transitioned
    }

    /// Stop the pending timeout without authorizing. Safe to call repeatedly.
    pub fn cancel_timer(&self) {
        self.timer.cancel();
    }

    pub fn timer_cancelled(&self) -> bool {
        self.timer.is_cancelled()
    }

    /// Run `on_expire` after `timeout` unless the session authorizes or the
    /// timer is cancelled first. `on_expire` must re-check the session: it
    /// can race with a late authorization.
    pub fn spawn_timeout<F>(&self, timeout: Duration, on_expire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let timer = self.timer.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(timeout) => on_expire(),
            }
        });
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
