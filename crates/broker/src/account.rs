// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authorized identities and the registry that tracks them.
//!
//! An [`Account`] exists only between a connection's successful auth and its
//! close. It refers to its connection weakly and remembers every topic it
//! joined so close can unsubscribe it everywhere in one pass.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::ErrorCode;
use crate::registry::SharedMap;
use crate::topic::Topic;

/// Anything that can accept an outbound frame without blocking.
pub trait FrameSink: Send + Sync {
    /// Enqueue one encoded frame. Fails fast with `Backpressure` or
    /// `TransportClosed` instead of waiting.
    fn write(&self, frame: Bytes) -> Result<(), ErrorCode>;
}

/// One authorized identity bound to one live connection.
pub struct Account {
    id: String,
    sink: Weak<dyn FrameSink>,
    subscriptions: Mutex<Subscriptions>,
}

#[derive(Default)]
struct Subscriptions {
    topics: HashMap<String, Arc<Topic>>,
    /// Set once the owning connection is gone; no new subscriptions after.
    retired: bool,
}

impl Account {
    pub fn new(id: impl Into<String>, sink: Weak<dyn FrameSink>) -> Arc<Self> {
        Arc::new(Self { id: id.into(), sink, subscriptions: Mutex::new(Subscriptions::default()) })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Forward a frame to the owning connection.
    pub fn write(&self, frame: Bytes) -> Result<(), ErrorCode> {
        match self.sink.upgrade() {
            Some(sink) => sink.write(frame),
            None => Err(ErrorCode::TransportClosed),
        }
    }

    /// Names of the topics this account is subscribed to.
    pub fn topics(&self) -> Vec<String> {
        self.subscriptions.lock().topics.keys().cloned().collect()
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.lock().topics.contains_key(topic)
    }

    pub fn is_retired(&self) -> bool {
        self.subscriptions.lock().retired
    }

    /// Join `topic`. Returns `Ok(false)` when already subscribed.
    pub(crate) fn attach(self: &Arc<Self>, topic: &Arc<Topic>) -> Result<bool, ErrorCode> {
        let mut subs = self.subscriptions.lock();
        if subs.retired {
            return Err(ErrorCode::TransportClosed);
        }
        if subs.topics.contains_key(topic.name()) {
            return Ok(false);
        }
        topic.add_subscriber(Arc::clone(self));
        subs.topics.insert(topic.name().to_owned(), Arc::clone(topic));
        Ok(true)
    }

    /// Leave `topic`. Returns `false` when not subscribed.
    pub(crate) fn detach(&self, topic: &str) -> bool {
        let removed = self.subscriptions.lock().topics.remove(topic);
        match removed {
            Some(t) => {
                t.remove_subscriber(&self.id);
                true
            }
            None => false,
        }
    }

    /// Leave every topic and refuse new subscriptions. Returns how many
    /// topics were left.
    pub(crate) fn retire(&self) -> usize {
        let topics = {
            let mut subs = self.subscriptions.lock();
            subs.retired = true;
            std::mem::take(&mut subs.topics)
        };
        for topic in topics.values() {
            topic.remove_subscriber(&self.id);
        }
        topics.len()
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Process-wide map from connection identity to [`Account`].
#[derive(Default)]
pub struct AccountRegistry {
    accounts: SharedMap<String, Arc<Account>>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store the account for `id`. An existing account for the
    /// same identity is returned unchanged.
    pub fn register(&self, id: &str, sink: Weak<dyn FrameSink>) -> Arc<Account> {
        let (account, _) = self.accounts.get_or_insert_with(id.to_owned(), || Account::new(id, sink));
        account
    }

    pub fn get(&self, id: &str) -> Option<Arc<Account>> {
        self.accounts.get(id)
    }

    /// Remove the account and unsubscribe it from every topic.
    pub fn remove(&self, id: &str) -> Option<Arc<Account>> {
        let account = self.accounts.remove(id)?;
        account.retire();
        Some(account)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
