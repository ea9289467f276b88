use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::models::{SharedValue, SubscriberId};

/// Message sender for a subscriber's delivery queue
pub type MessageSender = mpsc::Sender<SharedValue>;

/// Receiving end of a subscriber's delivery queue
pub type MessageReceiver = mpsc::Receiver<SharedValue>;

/// Why a value could not be handed to a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("subscriber queue closed")]
    Closed,

    #[error("subscriber queue full")]
    Full,
}

impl DeliveryError {
    const fn outcome(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Full => "full",
        }
    }
}

/// Subscriber information
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub sender: MessageSender,
    pub connected_at: Instant,
}

impl Subscriber {
    /// Non-blocking hand-off into the subscriber's queue
    pub fn deliver(&self, value: SharedValue) -> Result<(), DeliveryError> {
        self.sender.try_send(value).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Result of registering a subscriber
#[derive(Debug)]
pub struct Registration {
    pub id: SubscriberId,
    pub receiver: MessageReceiver,
}

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub evicted: usize,
}

/// Registry of connected subscribers and their delivery queues
///
/// Each subscriber owns a bounded queue. A broadcast never waits on a
/// queue: a closed or full queue evicts that subscriber and the broadcast
/// moves on to the next one.
#[derive(Clone)]
pub struct SubscriberRegistry {
    subscribers: Arc<DashMap<SubscriberId, Subscriber>>,
    buffer: usize,
}

impl SubscriberRegistry {
    /// Create a registry whose per-subscriber queues hold `buffer` values
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Register a subscriber with `initial` already queued as its first value
    pub fn register(&self, initial: SharedValue) -> Registration {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = SubscriberId::new();
        let subscriber = Subscriber {
            id: id.clone(),
            sender: tx,
            connected_at: Instant::now(),
        };

        // Fresh queue with capacity >= 1, cannot be full or closed
        if let Err(e) = subscriber.deliver(initial) {
            warn!(subscriber_id = %id, error = %e, "Failed to queue initial snapshot");
        }

        self.subscribers.insert(id.clone(), subscriber);
        metrics::SUBSCRIBERS.set(self.gauge_len());

        info!(
            subscriber_id = %id,
            subscribers = self.subscribers.len(),
            "Subscriber registered"
        );

        Registration { id, receiver: rx }
    }

    /// Remove a subscriber. Unknown or already removed ids are a no-op.
    pub fn unregister(&self, id: &SubscriberId) -> bool {
        if let Some((_, subscriber)) = self.subscribers.remove(id) {
            metrics::SUBSCRIBERS.set(self.gauge_len());
            info!(
                subscriber_id = %id,
                duration = ?subscriber.connected_at.elapsed(),
                subscribers = self.subscribers.len(),
                "Subscriber unregistered"
            );
            true
        } else {
            debug!(subscriber_id = %id, "Subscriber already unregistered");
            false
        }
    }

    /// Deliver `value` to every registered subscriber
    pub fn broadcast(&self, value: &SharedValue) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();

        for entry in self.subscribers.iter() {
            let subscriber = entry.value();
            match subscriber.deliver(value.clone()) {
                Ok(()) => {
                    report.delivered += 1;
                    metrics::DELIVERIES_TOTAL.with_label_values(&["delivered"]).inc();
                }
                Err(err) => {
                    warn!(
                        subscriber_id = %subscriber.id,
                        version = value.version,
                        error = %err,
                        "Failed to deliver value, marking for cleanup"
                    );
                    metrics::DELIVERIES_TOTAL
                        .with_label_values(&[err.outcome()])
                        .inc();
                    failed.push(subscriber.id.clone());
                }
            }
        }

        // Removal happens after iteration; the map shards are still borrowed inside the loop
        for id in failed {
            if self.unregister(&id) {
                report.evicted += 1;
            }
        }

        debug!(
            version = value.version,
            delivered = report.delivered,
            evicted = report.evicted,
            "Broadcast complete"
        );

        report
    }

    /// Drop every subscriber, closing all delivery queues
    pub fn close_all(&self) -> usize {
        let count = self.subscribers.len();
        self.subscribers.clear();
        metrics::SUBSCRIBERS.set(0);
        if count > 0 {
            info!(subscribers = count, "Closed all subscriber queues");
        }
        count
    }

    #[must_use]
    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.subscribers.contains_key(id)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn gauge_len(&self) -> i64 {
        i64::try_from(self.subscribers.len()).unwrap_or(i64::MAX)
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SUBSCRIBER_BUFFER)
    }
}
