// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory topic broker decoupling the intake from output plugins.
//!
//! ```text
//! Intake handlers (many)      Broker                 Subscriptions
//!        │                       │                          │
//!        ├─ publish(topic) ────> │ ── mpsc (bounded) ─────> rx (plugin A, topic)
//!        └─ publish(topic) ────> │ ── mpsc (bounded) ─────> rx (plugin B, topic)
//! ```
//!
//! Every subscriber owns a bounded queue. Publishing to a topic without
//! subscribers drops the message, and publishing after [`Broker::close`] is a
//! silent no-op. Closing the broker drops every queue sender so each
//! [`Subscription`] yields the messages already buffered and then ends.
//!
//! The registry lock is only held to copy the subscriber list of a topic;
//! delivery into the queues happens after it is released. A full queue
//! therefore stalls only the publishing task, never a concurrent
//! [`Broker::subscribe`] or [`Broker::close`]. With a delivery timeout the
//! stall is bounded: a subscriber whose queue stays full that long misses the
//! message and the others still get it.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, trace, warn};

/// Default depth of every subscriber queue.
pub const SUBSCRIBER_CHANNEL_BUFFER_SIZE: usize = 10;

#[derive(Default)]
struct Registry {
    subscribers: HashMap<String, Vec<Sender<Bytes>>>,
    closed: bool,
}

pub struct Broker {
    registry: RwLock<Registry>,
    capacity: usize,
    delivery_timeout: Option<Duration>,
}

impl Default for Broker {
    fn default() -> Self {
        Broker::new(SUBSCRIBER_CHANNEL_BUFFER_SIZE)
    }
}

impl Broker {
    /// Creates an open broker whose subscriber queues hold up to `capacity` messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Broker {
            registry: RwLock::new(Registry::default()),
            capacity: capacity.max(1),
            delivery_timeout: None,
        }
    }

    /// Like [`Broker::new`], but a publish waits at most `timeout` on each full
    /// queue before skipping that subscriber.
    #[must_use]
    pub fn with_delivery_timeout(capacity: usize, timeout: Duration) -> Self {
        Broker {
            delivery_timeout: Some(timeout),
            ..Broker::new(capacity)
        }
    }

    /// Registers a new queue for `topic`.
    ///
    /// Subscribing to a closed broker returns a subscription that is already
    /// at end-of-sequence.
    pub fn subscribe(&self, topic: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);

        #[allow(clippy::expect_used)]
        let mut registry = self.registry.write().expect("lock poisoned");
        if registry.closed {
            debug!("Subscription to {topic} on a closed broker");
        } else {
            registry
                .subscribers
                .entry(topic.to_string())
                .or_default()
                .push(tx);
        }

        Subscription {
            topic: topic.to_string(),
            rx,
        }
    }

    /// Delivers `message` to every current subscriber of `topic`, in publish order.
    ///
    /// Waits while a subscriber queue is full, up to the delivery timeout if one
    /// is set. Never fails: messages for topics without subscribers, or
    /// published after close, are dropped.
    pub async fn publish(&self, topic: &str, message: Bytes) {
        let senders = {
            #[allow(clippy::expect_used)]
            let registry = self.registry.read().expect("lock poisoned");
            if registry.closed {
                trace!("Broker closed, dropping message for {topic}");
                return;
            }
            match registry.subscribers.get(topic) {
                Some(senders) => senders.clone(),
                None => {
                    trace!("No subscribers for {topic}, dropping message");
                    return;
                }
            }
        };

        for tx in senders {
            let Some(limit) = self.delivery_timeout else {
                if tx.send(message.clone()).await.is_err() {
                    debug!("Subscriber of {topic} is gone, message not delivered");
                }
                continue;
            };
            match tx.send_timeout(message.clone(), limit).await {
                Ok(()) => {}
                Err(SendTimeoutError::Timeout(_)) => warn!(
                    "Subscriber of {topic} still full after {} ms, message skipped",
                    limit.as_millis()
                ),
                Err(SendTimeoutError::Closed(_)) => {
                    debug!("Subscriber of {topic} is gone, message not delivered");
                }
            }
        }
    }

    /// Marks the broker closed and ends every outstanding subscription. Idempotent.
    pub fn close(&self) {
        #[allow(clippy::expect_used)]
        let mut registry = self.registry.write().expect("lock poisoned");
        if registry.closed {
            return;
        }
        registry.closed = true;
        let topics = registry.subscribers.len();
        registry.subscribers.clear();
        debug!("Broker closed, released subscriptions for {topics} topics");
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        #[allow(clippy::expect_used)]
        let registry = self.registry.read().expect("lock poisoned");
        registry.closed
    }

    /// Number of live queues registered for `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        #[allow(clippy::expect_used)]
        let registry = self.registry.read().expect("lock poisoned");
        registry.subscribers.get(topic).map_or(0, Vec::len)
    }
}

/// Receiving end of a topic queue.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    rx: Receiver<Bytes>,
}

impl Subscription {
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next message for this topic, or `None` once the broker is closed and
    /// the queue is drained.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}
