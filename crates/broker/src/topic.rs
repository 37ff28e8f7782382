// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named broadcast channels.
//!
//! Each [`Topic`] owns a subscriber set and a bounded queue drained by exactly
//! one broadcast task. Publishing never waits: a full queue is reported as
//! `Backpressure`. The broadcast task delivers each payload to a snapshot of
//! the subscriber set, in publish order, skipping subscribers that refuse.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::account::Account;
use crate::error::ErrorCode;
use crate::registry::SharedMap;

/// Default capacity of a topic's broadcast queue.
pub const DEFAULT_TOPIC_QUEUE: usize = 16;

pub struct Topic {
    name: String,
    subscribers: SharedMap<String, Arc<Account>>,
    queue: mpsc::Sender<Bytes>,
}

impl Topic {
    pub(crate) fn new(name: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (queue, rx) = mpsc::channel(capacity.max(1));
        (Self { name: name.into(), subscribers: SharedMap::new(), queue }, rx)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.is_empty()
    }

    pub fn is_subscribed(&self, id: &str) -> bool {
        self.subscribers.contains(id)
    }

    pub fn subscriber(&self, id: &str) -> Option<Arc<Account>> {
        self.subscribers.get(id)
    }

    pub(crate) fn add_subscriber(&self, account: Arc<Account>) -> bool {
        let id = account.id().to_owned();
        self.subscribers.insert_new(id, account)
    }

    pub(crate) fn remove_subscriber(&self, id: &str) -> bool {
        self.subscribers.remove(id).is_some()
    }

    /// Enqueue `payload` for broadcast without waiting.
    pub fn publish(&self, payload: Bytes) -> Result<(), ErrorCode> {
        self.queue.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ErrorCode::Backpressure,
            mpsc::error::TrySendError::Closed(_) => ErrorCode::TransportClosed,
        })
    }

    /// Deliver one payload to every current subscriber. Returns how many
    /// accepted it.
    fn broadcast(&self, payload: &Bytes) -> usize {
        let mut delivered = 0;
        for account in self.subscribers.values() {
            match account.write(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(code) => {
                    debug!(topic = %self.name, conn_id = %account.id(), code = %code, "broadcast skipped subscriber");
                }
            }
        }
        delivered
    }
}

impl std::fmt::Debug for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Process-wide map from topic name to [`Topic`], created lazily.
pub struct TopicRegistry {
    topics: SharedMap<String, Arc<Topic>>,
    queue_capacity: usize,
    loops: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl TopicRegistry {
    /// Broadcast tasks stop when `shutdown` is cancelled or the registry is
    /// dropped.
    pub fn new(queue_capacity: usize, shutdown: &CancellationToken) -> Self {
        Self {
            topics: SharedMap::new(),
            queue_capacity,
            loops: Arc::new(AtomicUsize::new(0)),
            shutdown: shutdown.child_token(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Topic>> {
        self.topics.get(name)
    }

    /// Return the topic for `name`, creating it and starting its broadcast
    /// task if absent. Racing callers all observe the same instance.
    pub fn get_or_create(&self, name: &str) -> Arc<Topic> {
        let mut receiver = None;
        let (topic, created) = self.topics.get_or_insert_with(name.to_owned(), || {
            let (topic, rx) = Topic::new(name, self.queue_capacity);
            receiver = Some(rx);
            Arc::new(topic)
        });
        if let (true, Some(rx)) = (created, receiver) {
            debug!(topic = %name, "topic created");
            self.spawn_broadcast(Arc::clone(&topic), rx);
        }
        topic
    }

    /// Add `account` to `name`'s subscribers. `Ok(false)` if already there.
    pub fn subscribe(&self, name: &str, account: &Arc<Account>) -> Result<bool, ErrorCode> {
        if name.is_empty() {
            return Err(ErrorCode::InvalidTopic);
        }
        let topic = self.get_or_create(name);
        account.attach(&topic)
    }

    /// Remove `id` from `name`'s subscribers. Unknown topics and identities
    /// are a no-op.
    pub fn unsubscribe(&self, name: &str, id: &str) -> bool {
        let Some(topic) = self.topics.get(name) else {
            return false;
        };
        match topic.subscriber(id) {
            Some(account) => account.detach(name),
            None => topic.remove_subscriber(id),
        }
    }

    /// Enqueue `payload` on `name`'s broadcast queue.
    ///
    /// Topics are only created by subscribing. Publishing to a name nobody
    /// ever subscribed to drops the payload and returns `Ok(false)`.
    pub fn publish(&self, name: &str, payload: Bytes) -> Result<bool, ErrorCode> {
        if name.is_empty() {
            return Err(ErrorCode::InvalidTopic);
        }
        let Some(topic) = self.topics.get(name) else {
            trace!(topic = %name, "publish to unknown topic dropped");
            return Ok(false);
        };
        topic.publish(payload)?;
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.topics.keys()
    }

    /// Number of broadcast tasks still running.
    pub fn running_loops(&self) -> usize {
        self.loops.load(Ordering::Acquire)
    }

    fn spawn_broadcast(&self, topic: Arc<Topic>, mut rx: mpsc::Receiver<Bytes>) {
        let shutdown = self.shutdown.clone();
        let guard = LoopGuard::enter(Arc::clone(&self.loops));
        tokio::spawn(async move {
            let _guard = guard;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = rx.recv() => {
                        let Some(payload) = next else { break };
                        topic.broadcast(&payload);
                    }
                }
            }
            debug!(topic = %topic.name(), "broadcast loop stopped");
        });
    }
}

impl Drop for TopicRegistry {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Counts a broadcast task for as long as it lives.
struct LoopGuard(Arc<AtomicUsize>);

impl LoopGuard {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
#[path = "topic_tests.rs"]
mod tests;
