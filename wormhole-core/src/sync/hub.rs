//! Synchronization hub
//!
//! Owns the shared state cell and runs the expiry state machine:
//!
//! | From  | Event                     | To    |
//! |-------|---------------------------|-------|
//! | EMPTY | write(non-empty)          | SET   |
//! | EMPTY | write("")                 | EMPTY |
//! | SET   | write(non-empty)          | SET   |
//! | SET   | write("")                 | EMPTY |
//! | SET   | expiry timer fires        | EMPTY |
//!
//! Writes, clears and timer fires all run under one mutex. Every accepted
//! transition is broadcast to all subscribers, published on the watch
//! channel and handed to the observers before the lock is released, so each
//! subscriber sees transitions in version order.
//!
//! An expiry timer captures the cell version it was armed for. On fire it
//! only clears the value if the version is unchanged; any later write or
//! clear turns it into a no-op, whether or not its cancellation arrived in
//! time.

use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::cell::SharedStateCell;
use super::observer::ValueObserver;
use super::registry::{MessageReceiver, SubscriberRegistry};
use crate::clock::{default_clock, SharedClock};
use crate::config::{SyncConfig, DEFAULT_SUBSCRIBER_BUFFER, DEFAULT_TTL_MS};
use crate::metrics;
use crate::models::{SharedValue, SubscriberId, ValueState};

/// Hub configuration
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Inactivity window after which the value reverts to empty
    pub ttl: Duration,
    /// Capacity of each subscriber's delivery queue
    pub subscriber_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_millis(DEFAULT_TTL_MS),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

impl From<&SyncConfig> for HubConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            ttl: config.ttl(),
            subscriber_buffer: config.subscriber_buffer,
        }
    }
}

struct ExpiryTimer {
    armed_version: u64,
    deadline: Instant,
    cancel: CancellationToken,
}

struct HubState {
    cell: SharedStateCell,
    timer: Option<ExpiryTimer>,
}

struct HubInner {
    state: Mutex<HubState>,
    registry: SubscriberRegistry,
    observers: RwLock<Vec<Arc<dyn ValueObserver>>>,
    value_tx: watch::Sender<SharedValue>,
    config: HubConfig,
}

/// Handle to the single shared value
///
/// Cheap to clone; all clones drive the same value. Writes arm expiry
/// timers with `tokio::spawn`, so they must be issued from within a tokio
/// runtime.
#[derive(Clone)]
pub struct SyncHub {
    inner: Arc<HubInner>,
}

impl SyncHub {
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        Self::with_clock(config, default_clock())
    }

    #[must_use]
    pub fn with_clock(config: HubConfig, clock: SharedClock) -> Self {
        let cell = SharedStateCell::new(clock);
        let (value_tx, _) = watch::channel(cell.read());
        let registry = SubscriberRegistry::new(config.subscriber_buffer);

        info!(
            ttl = ?config.ttl,
            subscriber_buffer = config.subscriber_buffer,
            "SyncHub initialized"
        );

        Self {
            inner: Arc::new(HubInner {
                state: Mutex::new(HubState { cell, timer: None }),
                registry,
                observers: RwLock::new(Vec::new()),
                value_tx,
                config,
            }),
        }
    }

    /// Register an outbound observer for every future transition
    pub fn add_observer(&self, observer: Arc<dyn ValueObserver>) {
        self.inner.observers.write().push(observer);
    }

    /// Apply a client edit. Every string is accepted; `""` clears the value.
    pub fn on_client_write(&self, content: impl Into<String>) -> SharedValue {
        let content = content.into();
        let mut state = self.inner.state.lock();
        let previous = state.cell.read().state();

        let value = match (previous, content.is_empty()) {
            (ValueState::Set, true) => {
                Self::cancel_timer(&mut state);
                state.cell.clear()
            }
            (ValueState::Empty, true) => state.cell.write(content),
            (_, false) => {
                let value = state.cell.write(content);
                self.arm_timer(&mut state, &value);
                value
            }
        };

        metrics::WRITES_TOTAL.inc();
        debug!(
            version = value.version,
            from = ?previous,
            to = ?value.state(),
            len = value.content.len(),
            "Write accepted"
        );

        self.publish(&value);
        value
    }

    /// Register a new subscriber; its queue starts with the current snapshot
    pub fn on_client_connect(&self) -> Subscription {
        // Held across registration so no transition slips in between the
        // snapshot and the subscriber becoming visible to broadcasts
        let state = self.inner.state.lock();
        let snapshot = state.cell.read();
        let registration = self.inner.registry.register(snapshot.clone());
        drop(state);

        Subscription {
            id: registration.id,
            snapshot,
            receiver: registration.receiver,
            registry: self.inner.registry.clone(),
        }
    }

    /// Unregister a subscriber. Idempotent.
    pub fn on_client_disconnect(&self, id: &SubscriberId) -> bool {
        self.inner.registry.unregister(id)
    }

    /// Current value
    #[must_use]
    pub fn snapshot(&self) -> SharedValue {
        self.inner.state.lock().cell.read()
    }

    /// Receiver that always holds the latest value
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SharedValue> {
        self.inner.value_tx.subscribe()
    }

    /// Resolve with the first value whose content differs from `last_seen`
    ///
    /// Returns immediately if the current content already differs.
    pub async fn wait_for_change(&self, last_seen: &str) -> SharedValue {
        let mut rx = self.watch();
        loop {
            {
                let current = rx.borrow_and_update();
                if current.content != last_seen {
                    return current.clone();
                }
            }
            if rx.changed().await.is_err() {
                return self.snapshot();
            }
        }
    }

    /// Deadline of the active expiry timer, if the value is set
    #[must_use]
    pub fn expires_at(&self) -> Option<Instant> {
        self.inner.state.lock().timer.as_ref().map(|t| t.deadline)
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.inner.config.ttl
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.subscriber_count()
    }

    /// Cancel the pending expiry and close every subscriber queue
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            Self::cancel_timer(&mut state);
        }
        let closed = self.inner.registry.close_all();
        info!(subscribers = closed, "SyncHub shut down");
    }

    /// Handle an expiry timer armed for `armed_version`
    ///
    /// Returns the cleared value, or `None` if a write or clear superseded
    /// the timer.
    pub(crate) fn expire(&self, armed_version: u64) -> Option<SharedValue> {
        let mut state = self.inner.state.lock();
        let current = state.cell.version();

        if current != armed_version {
            metrics::EXPIRIES_TOTAL.with_label_values(&["stale"]).inc();
            debug!(
                armed_version,
                current_version = current,
                "Discarding stale expiry"
            );
            return None;
        }

        state.timer = None;
        let value = state.cell.clear();
        metrics::EXPIRIES_TOTAL.with_label_values(&["applied"]).inc();
        info!(
            armed_version,
            version = value.version,
            "Shared value expired"
        );

        self.publish(&value);
        Some(value)
    }

    fn arm_timer(&self, state: &mut HubState, value: &SharedValue) {
        Self::cancel_timer(state);

        let armed_version = value.version;
        let deadline = value.last_write_at + self.inner.config.ttl;
        let cancel = CancellationToken::new();
        let hub: Weak<HubInner> = Arc::downgrade(&self.inner);
        let token = cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep_until(deadline) => {
                    if let Some(inner) = hub.upgrade() {
                        SyncHub { inner }.expire(armed_version);
                    }
                }
            }
        });

        debug!(armed_version, ttl = ?self.inner.config.ttl, "Expiry timer armed");
        state.timer = Some(ExpiryTimer {
            armed_version,
            deadline,
            cancel,
        });
    }

    fn cancel_timer(state: &mut HubState) {
        if let Some(timer) = state.timer.take() {
            timer.cancel.cancel();
            debug!(armed_version = timer.armed_version, "Expiry timer cancelled");
        }
    }

    fn publish(&self, value: &SharedValue) {
        self.inner.registry.broadcast(value);
        self.inner.value_tx.send_replace(value.clone());
        for observer in self.inner.observers.read().iter() {
            observer.on_value_changed(value);
        }
    }
}

impl Default for SyncHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

/// A registered subscriber's view of the shared value
///
/// The first value received is the snapshot taken at registration.
/// Dropping the subscription unregisters it.
pub struct Subscription {
    id: SubscriberId,
    snapshot: SharedValue,
    receiver: MessageReceiver,
    registry: SubscriberRegistry,
}

impl Subscription {
    #[must_use]
    pub const fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Value at registration time
    #[must_use]
    pub const fn snapshot(&self) -> &SharedValue {
        &self.snapshot
    }

    /// Next delivered value, or `None` once the subscriber was unregistered
    pub async fn recv(&mut self) -> Option<SharedValue> {
        self.receiver.recv().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("snapshot_version", &self.snapshot.version)
            .finish_non_exhaustive()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unregister(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    const TTL: Duration = Duration::from_millis(5000);

    fn hub() -> SyncHub {
        SyncHub::new(HubConfig {
            ttl: TTL,
            subscriber_buffer: 64,
        })
    }

    #[derive(Default)]
    struct RecordingObserver {
        seen: Mutex<Vec<(u64, String)>>,
    }

    impl ValueObserver for RecordingObserver {
        fn on_value_changed(&self, value: &SharedValue) {
            self.seen.lock().push((value.version, value.content.clone()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_reaches_every_subscriber() {
        let hub = hub();
        let mut a = hub.on_client_connect();
        let mut b = hub.on_client_connect();
        assert_eq!(a.recv().await.unwrap().content, "");
        assert_eq!(b.recv().await.unwrap().content, "");

        let written = hub.on_client_write("123");

        let seen_a = a.recv().await.unwrap();
        let seen_b = b.recv().await.unwrap();
        assert_eq!(seen_a, written);
        assert_eq!(seen_b, written);
        assert_eq!(written.version, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_value_expires_after_ttl() {
        let hub = hub();
        let mut sub = hub.on_client_connect();
        sub.recv().await.unwrap();

        let start = Instant::now();
        hub.on_client_write("123");
        assert_eq!(sub.recv().await.unwrap().content, "123");

        let cleared = sub.recv().await.unwrap();
        let elapsed = Instant::now() - start;

        assert_eq!(cleared.content, "");
        assert_eq!(cleared.version, 2);
        assert!(elapsed >= TTL, "expired early after {elapsed:?}");
        assert!(elapsed < TTL + Duration::from_millis(50), "expired late after {elapsed:?}");
        assert_eq!(hub.snapshot().state(), ValueState::Empty);
        assert!(hub.expires_at().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_clear_before_ttl() {
        let hub = hub();
        let mut sub = hub.on_client_connect();
        sub.recv().await.unwrap();

        hub.on_client_write("123");
        sub.recv().await.unwrap();

        let early = timeout(TTL - Duration::from_millis(1), sub.recv()).await;
        assert!(early.is_err(), "value cleared before the TTL elapsed");
        assert_eq!(hub.snapshot().content, "123");
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_rearms_expiry() {
        let hub = hub();
        let mut sub = hub.on_client_connect();
        sub.recv().await.unwrap();

        let start = Instant::now();
        hub.on_client_write("first");
        tokio::time::sleep(Duration::from_millis(3000)).await;
        hub.on_client_write("second");

        assert_eq!(sub.recv().await.unwrap().content, "first");
        assert_eq!(sub.recv().await.unwrap().content, "second");

        // Original deadline at T+5000 passes without a clear
        let at_first_deadline = timeout(Duration::from_millis(4000), sub.recv()).await;
        assert!(at_first_deadline.is_err());
        assert_eq!(hub.snapshot().content, "second");

        let cleared = sub.recv().await.unwrap();
        let elapsed = Instant::now() - start;
        assert_eq!(cleared.content, "");
        assert!(elapsed >= Duration::from_millis(8000));
        assert!(elapsed < Duration::from_millis(8050));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_joiner_gets_current_value() {
        let hub = hub();
        hub.on_client_write("already here");

        let mut late = hub.on_client_connect();

        assert_eq!(late.snapshot().content, "already here");
        let first = late.recv().await.unwrap();
        assert_eq!(first.content, "already here");
        assert_eq!(first.version, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_isolation() {
        let hub = hub();
        let mut a = hub.on_client_connect();
        let b = hub.on_client_connect();
        a.recv().await.unwrap();

        assert!(hub.on_client_disconnect(b.id()));
        assert!(!hub.on_client_disconnect(b.id()));
        assert_eq!(hub.subscriber_count(), 1);

        hub.on_client_write("still flowing");
        assert_eq!(a.recv().await.unwrap().content, "still flowing");
        assert_eq!(hub.snapshot().content, "still flowing");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_subscription_unregisters() {
        let hub = hub();
        let sub = hub.on_client_connect();
        assert_eq!(hub.subscriber_count(), 1);

        drop(sub);

        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_expiry_is_discarded() {
        let hub = hub();
        let first = hub.on_client_write("a");
        let second = hub.on_client_write("b");

        assert!(hub.expire(first.version).is_none());
        assert_eq!(hub.snapshot(), second);

        let cleared = hub.expire(second.version).unwrap();
        assert_eq!(cleared.content, "");

        // A second fire for the same arming cannot clear again
        assert!(hub.expire(second.version).is_none());
        assert_eq!(hub.snapshot().version, cleared.version);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_write_clears_and_cancels_timer() {
        let hub = hub();
        let observer = Arc::new(RecordingObserver::default());
        hub.add_observer(observer.clone());
        let mut sub = hub.on_client_connect();
        sub.recv().await.unwrap();

        hub.on_client_write("123");
        assert!(hub.expires_at().is_some());
        let cleared = hub.on_client_write("");

        assert_eq!(cleared.content, "");
        assert_eq!(cleared.version, 2);
        assert!(hub.expires_at().is_none());
        assert_eq!(sub.recv().await.unwrap().content, "123");
        assert_eq!(sub.recv().await.unwrap().content, "");

        // No expiry transition follows
        let after = timeout(TTL * 2, sub.recv()).await;
        assert!(after.is_err());
        assert_eq!(observer.seen.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_write_on_empty_value_is_visible() {
        let hub = hub();
        let mut sub = hub.on_client_connect();
        sub.recv().await.unwrap();

        let value = hub.on_client_write("");

        assert_eq!(value.version, 1);
        assert!(hub.expires_at().is_none());
        let seen = sub.recv().await.unwrap();
        assert_eq!(seen.content, "");
        assert_eq!(seen.version, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_called_once_per_transition() {
        let hub = hub();
        let observer = Arc::new(RecordingObserver::default());
        hub.add_observer(observer.clone());
        let mut sub = hub.on_client_connect();
        sub.recv().await.unwrap();

        hub.on_client_write("x");
        hub.on_client_write("y");
        sub.recv().await.unwrap();
        sub.recv().await.unwrap();
        // Expiry
        sub.recv().await.unwrap();

        let seen = observer.seen.lock().clone();
        assert_eq!(
            seen,
            vec![
                (1, "x".to_string()),
                (2, "y".to_string()),
                (3, String::new()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_change() {
        let hub = hub();
        hub.on_client_write("seen");

        let immediate = hub.wait_for_change("other").await;
        assert_eq!(immediate.content, "seen");

        let waiter = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.wait_for_change("seen").await })
        };
        tokio::task::yield_now().await;
        hub.on_client_write("next");

        let changed = waiter.await.unwrap();
        assert_eq!(changed.content, "next");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_change_observes_expiry() {
        let hub = hub();
        hub.on_client_write("short lived");

        let start = Instant::now();
        let value = hub.wait_for_change("short lived").await;

        assert_eq!(value.content, "");
        assert!(Instant::now() - start >= TTL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_subscribers_and_cancels_expiry() {
        let hub = hub();
        let mut sub = hub.on_client_connect();
        sub.recv().await.unwrap();
        hub.on_client_write("pending");
        sub.recv().await.unwrap();

        hub.shutdown();

        assert!(sub.recv().await.is_none());
        assert!(hub.expires_at().is_none());
        tokio::time::sleep(TTL * 2).await;
        assert_eq!(hub.snapshot().content, "pending");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concrete_two_client_scenario() {
        let hub = hub();
        let mut a = hub.on_client_connect();
        let mut b = hub.on_client_connect();
        a.recv().await.unwrap();
        b.recv().await.unwrap();

        let start = Instant::now();
        hub.on_client_write("123");

        let seen_b = timeout(Duration::from_millis(200), b.recv())
            .await
            .expect("B did not observe the write in time")
            .unwrap();
        assert_eq!(seen_b.content, "123");
        assert_eq!(a.recv().await.unwrap().content, "123");

        let cleared_a = a.recv().await.unwrap();
        let cleared_b = b.recv().await.unwrap();
        assert_eq!(cleared_a.content, "");
        assert_eq!(cleared_b, cleared_a);
        assert!(Instant::now() - start >= TTL);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_converge() {
        let hub = SyncHub::new(HubConfig {
            ttl: Duration::from_secs(60),
            subscriber_buffer: 1024,
        });
        let mut watcher = hub.on_client_connect();
        watcher.recv().await.unwrap();

        let mut writers = Vec::new();
        for writer in 0..4 {
            let hub = hub.clone();
            writers.push(tokio::spawn(async move {
                for i in 0..50 {
                    hub.on_client_write(format!("w{writer}-{i}"));
                    tokio::task::yield_now().await;
                }
            }));
        }
        for writer in writers {
            writer.await.unwrap();
        }

        let mut last: Option<SharedValue> = None;
        for _ in 0..200 {
            let value = watcher.recv().await.unwrap();
            if let Some(previous) = &last {
                assert!(previous.is_superseded_by(&value));
            }
            last = Some(value);
        }

        let last = last.unwrap();
        assert_eq!(last.version, 200);
        assert_eq!(hub.snapshot(), last);
    }
}
