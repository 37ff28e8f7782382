// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::account::AccountRegistry;
use crate::config::BrokerOptions;
use crate::topic::TopicRegistry;

/// Shared broker state, handed to every connection at construction.
pub struct BrokerState {
    pub options: BrokerOptions,
    pub accounts: AccountRegistry,
    pub topics: TopicRegistry,
    /// Cancelled once on process shutdown; connection tokens are children.
    pub shutdown: CancellationToken,
    connections: AtomicUsize,
    conn_seq: AtomicU64,
}

impl BrokerState {
    pub fn new(options: BrokerOptions, shutdown: CancellationToken) -> Arc<Self> {
        let topics = TopicRegistry::new(options.topic_queue, &shutdown);
        Arc::new(Self {
            options,
            accounts: AccountRegistry::new(),
            topics,
            shutdown,
            connections: AtomicUsize::new(0),
            conn_seq: AtomicU64::new(0),
        })
    }

    /// Connections constructed and not yet closed.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }

    pub(crate) fn connection_opened(&self) -> u64 {
        self.connections.fetch_add(1, Ordering::AcqRel);
        self.conn_seq.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn connection_closed(&self) {
        self.connections.fetch_sub(1, Ordering::AcqRel);
    }
}
