// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{hash_credential, sha1_hex, verify_credential, AuthSession};
use crate::error::ErrorCode;

#[test]
fn sha1_known_vector() {
    assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    assert_eq!(sha1_hex(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
}

#[yare::parameterized(
    open_none        = { None, "", Ok(()) },
    open_empty       = { Some(""), "anything", Ok(()) },
    missing          = { Some("secret"), "", Err(ErrorCode::CredentialMissing) },
    plaintext        = { Some("secret"), "secret", Err(ErrorCode::CredentialInvalid) },
    wrong_hash       = { Some("secret"), "a9993e364706816aba3e25717850c26c9cd0d89d",
                         Err(ErrorCode::CredentialInvalid) },
)]
fn credential_policy(password: Option<&str>, credential: &str, expected: Result<(), ErrorCode>) {
    assert_eq!(verify_credential(password, credential), expected);
}

#[test]
fn matching_hash_passes() {
    let credential = hash_credential("secret");
    assert_eq!(verify_credential(Some("secret"), &credential), Ok(()));
}

#[test]
fn hash_comparison_ignores_hex_case() {
    let credential = hash_credential("secret").to_ascii_uppercase();
    assert_eq!(verify_credential(Some("secret"), &credential), Ok(()));
}

#[test]
fn authorize_transitions_once() {
    let parent = CancellationToken::new();
    let session = AuthSession::new(&parent);
    assert!(!session.is_authorized());
    assert!(session.authorize());
    assert!(!session.authorize());
    assert!(session.is_authorized());
    assert!(session.timer_cancelled());
}

#[test]
fn parent_cancel_stops_timer() {
    let parent = CancellationToken::new();
    let session = AuthSession::new(&parent);
    parent.cancel();
    assert!(session.timer_cancelled());
    assert!(!session.is_authorized());
}

#[tokio::test]
async fn timeout_fires_when_unauthorized() -> anyhow::Result<()> {
    let parent = CancellationToken::new();
    let session = AuthSession::new(&parent);
    let fired = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&fired);
    session.spawn_timeout(Duration::from_millis(50), move || flag.store(true, Ordering::SeqCst));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!fired.load(Ordering::SeqCst), "fired before the deadline");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(fired.load(Ordering::SeqCst), "did not fire after the deadline");
    Ok(())
}

#[tokio::test]
async fn authorize_cancels_timeout() -> anyhow::Result<()> {
    let parent = CancellationToken::new();
    let session = AuthSession::new(&parent);
    let fired = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&fired);
    session.spawn_timeout(Duration::from_millis(50), move || flag.store(true, Ordering::SeqCst));

    session.authorize();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!fired.load(Ordering::SeqCst));
    Ok(())
}

#[tokio::test]
async fn redundant_cancel_is_harmless() -> anyhow::Result<()> {
    let parent = CancellationToken::new();
    let session = AuthSession::new(&parent);
    let fired = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&fired);
    session.spawn_timeout(Duration::from_millis(30), move || flag.store(true, Ordering::SeqCst));

    session.cancel_timer();
    session.cancel_timer();
    parent.cancel();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!fired.load(Ordering::SeqCst));
    Ok(())
}
