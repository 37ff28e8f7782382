// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

use super::{BrokerOptions, Config};

fn parse(args: &[&str]) -> anyhow::Result<Config> {
    Ok(Config::try_parse_from(args)?)
}

#[test]
fn defaults_match_broker_options() -> anyhow::Result<()> {
    let config = parse(&["fanout", "--tcp-addr", "127.0.0.1:7000"])?;
    config.validate()?;
    let options = config.options();
    let defaults = BrokerOptions::default();
    assert_eq!(options.ping_interval, defaults.ping_interval);
    assert_eq!(options.max_ping_out, defaults.max_ping_out);
    assert_eq!(options.auth_timeout, defaults.auth_timeout);
    assert_eq!(options.write_timeout, defaults.write_timeout);
    assert_eq!(options.max_frame_len, defaults.max_frame_len);
    assert_eq!(options.conn_queue, defaults.conn_queue);
    assert_eq!(options.topic_queue, defaults.topic_queue);
    assert_eq!(options.password, None);
    assert_eq!(options.liveness_limit(), Duration::from_secs(90));
    Ok(())
}

#[test]
fn overrides_flow_into_options() -> anyhow::Result<()> {
    let config = parse(&[
        "fanout",
        "--ws-addr",
        "127.0.0.1:7001",
        "--ping-interval-ms",
        "0",
        "--auth-timeout-ms",
        "250",
        "--password",
        "secret",
        "--conn-queue",
        "8",
    ])?;
    config.validate()?;
    let options = config.options();
    assert!(!options.keepalive_enabled());
    assert_eq!(options.auth_timeout, Duration::from_millis(250));
    assert_eq!(options.password.as_deref(), Some("secret"));
    assert_eq!(options.conn_queue, 8);
    Ok(())
}

#[test]
fn empty_password_is_open_mode() -> anyhow::Result<()> {
    let config = parse(&["fanout", "--tcp-addr", "127.0.0.1:7000", "--password", ""])?;
    assert_eq!(config.options().password, None);
    Ok(())
}

#[yare::parameterized(
    no_listener      = { &["fanout"], "--tcp-addr or --ws-addr" },
    zero_conn_queue  = { &["fanout", "--tcp-addr", "127.0.0.1:1", "--conn-queue", "0"], "--conn-queue" },
    zero_topic_queue = { &["fanout", "--tcp-addr", "127.0.0.1:1", "--topic-queue", "0"], "--topic-queue" },
    zero_auth        = { &["fanout", "--tcp-addr", "127.0.0.1:1", "--auth-timeout-ms", "0"], "--auth-timeout-ms" },
    zero_ping_out    = { &["fanout", "--tcp-addr", "127.0.0.1:1", "--max-ping-out", "0"], "--max-ping-out" },
    tiny_frame       = { &["fanout", "--tcp-addr", "127.0.0.1:1", "--max-frame-len", "1"], "--max-frame-len" },
    bad_log_format   = { &["fanout", "--tcp-addr", "127.0.0.1:1", "--log-format", "xml"], "log format" },
)]
fn invalid_config(args: &[&str], expected_substr: &str) {
    let result = parse(args).and_then(|c| c.validate());
    crate::assert_err_contains!(result, expected_substr);
}

#[test]
fn malformed_address_fails_to_parse() {
    assert!(parse(&["fanout", "--tcp-addr", "not-an-addr"]).is_err());
}
