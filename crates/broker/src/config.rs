// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::framing::DEFAULT_MAX_FRAME_LEN;
use crate::packet::MIN_PACKET_LEN;
use crate::topic::DEFAULT_TOPIC_QUEUE;

/// Default capacity of a connection's outbound queue.
pub const DEFAULT_CONN_QUEUE: usize = 64;

/// Lightweight pub/sub broker over TCP and WebSocket.
#[derive(Debug, Clone, Parser)]
#[command(name = "fanout", version, about)]
pub struct Config {
    /// Address for the length-framed TCP listener.
    #[arg(long, env = "FANOUT_TCP_ADDR")]
    pub tcp_addr: Option<SocketAddr>,

    /// Address for the HTTP listener (WebSocket upgrade at /ws, health).
    #[arg(long, env = "FANOUT_WS_ADDR")]
    pub ws_addr: Option<SocketAddr>,

    /// Server ping interval in ms (0 disables keepalive).
    #[arg(long, env = "FANOUT_PING_INTERVAL_MS", default_value = "30000")]
    pub ping_interval_ms: u64,

    /// Unanswered ping intervals tolerated before a connection is closed.
    #[arg(long, env = "FANOUT_MAX_PING_OUT", default_value = "3")]
    pub max_ping_out: u32,

    /// Time a connection has to authenticate, in ms.
    #[arg(long, env = "FANOUT_AUTH_TIMEOUT_MS", default_value = "10000")]
    pub auth_timeout_ms: u64,

    /// Shared password. Unset or empty accepts every client.
    #[arg(long, env = "FANOUT_PASSWORD")]
    pub password: Option<String>,

    /// Base per-write deadline in ms; large frames get extra allowance.
    #[arg(long, env = "FANOUT_WRITE_TIMEOUT_MS", default_value = "10000")]
    pub write_timeout_ms: u64,

    /// Largest accepted frame in bytes.
    #[arg(long, env = "FANOUT_MAX_FRAME_LEN", default_value_t = DEFAULT_MAX_FRAME_LEN)]
    pub max_frame_len: usize,

    /// Outbound queue capacity per connection.
    #[arg(long, env = "FANOUT_CONN_QUEUE", default_value_t = DEFAULT_CONN_QUEUE)]
    pub conn_queue: usize,

    /// Broadcast queue capacity per topic.
    #[arg(long, env = "FANOUT_TOPIC_QUEUE", default_value_t = DEFAULT_TOPIC_QUEUE)]
    pub topic_queue: usize,

    /// Log format (json or text).
    #[arg(long, env = "FANOUT_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "FANOUT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tcp_addr.is_none() && self.ws_addr.is_none() {
            anyhow::bail!("either --tcp-addr or --ws-addr must be specified");
        }
        if self.conn_queue == 0 {
            anyhow::bail!("--conn-queue must be at least 1");
        }
        if self.topic_queue == 0 {
            anyhow::bail!("--topic-queue must be at least 1");
        }
        if self.auth_timeout_ms == 0 {
            anyhow::bail!("--auth-timeout-ms must be positive");
        }
        if self.max_ping_out == 0 {
            anyhow::bail!("--max-ping-out must be at least 1");
        }
        if self.max_frame_len < MIN_PACKET_LEN {
            anyhow::bail!("--max-frame-len must be at least {MIN_PACKET_LEN}");
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        Ok(())
    }

    /// The read-only options handle shared by every connection.
    pub fn options(&self) -> BrokerOptions {
        BrokerOptions {
            ping_interval: Duration::from_millis(self.ping_interval_ms),
            max_ping_out: self.max_ping_out,
            auth_timeout: Duration::from_millis(self.auth_timeout_ms),
            password: self.password.clone().filter(|p| !p.is_empty()),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            max_frame_len: self.max_frame_len,
            conn_queue: self.conn_queue,
            topic_queue: self.topic_queue,
        }
    }
}

/// Settings every connection reads and none mutate.
#[derive(Debug, Clone)]
pub struct BrokerOptions {
    /// Zero disables keepalive.
    pub ping_interval: Duration,
    pub max_ping_out: u32,
    pub auth_timeout: Duration,
    /// `None` is open mode.
    pub password: Option<String>,
    pub write_timeout: Duration,
    pub max_frame_len: usize,
    pub conn_queue: usize,
    pub topic_queue: usize,
}

impl BrokerOptions {
    /// Silence after which a connection counts as dead.
    pub fn liveness_limit(&self) -> Duration {
        self.ping_interval.saturating_mul(self.max_ping_out)
    }

    pub fn keepalive_enabled(&self) -> bool {
        !self.ping_interval.is_zero()
    }
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            max_ping_out: 3,
            auth_timeout: Duration::from_secs(10),
            password: None,
            write_timeout: Duration::from_secs(10),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            conn_queue: DEFAULT_CONN_QUEUE,
            topic_queue: DEFAULT_TOPIC_QUEUE,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
