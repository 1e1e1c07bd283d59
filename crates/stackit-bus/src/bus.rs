//! # Event Bus
//!
//! The registry and publishing side of the realtime bus. Delivery is
//! synchronous: `publish` invokes every registered callback for the
//! payload's kind before returning, in subscription order.

use crate::events::{Event, EventKind, EventPayload, InvalidEvent};
use crate::subscriber::{EventStream, SubscriptionGuard, SubscriptionState};
use crate::DEFAULT_STREAM_CAPACITY;
use parking_lot::{ReentrantMutex, RwLock};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Trait for publishing events to the bus.
///
/// This is the interface both the connection layer and local actions
/// (such as an optimistic vote) use to emit events for consumption by
/// the rest of the application.
pub trait EventPublisher: Send + Sync {
    /// Publish an event to the bus.
    ///
    /// The payload is validated, stamped with a sequence number and
    /// timestamp, and delivered synchronously to every subscriber of
    /// its kind.
    ///
    /// # Returns
    ///
    /// The number of subscribers that completed delivery. A rejected
    /// payload returns an error before any subscriber is invoked.
    fn publish(&self, payload: EventPayload) -> Result<usize, InvalidEvent>;

    /// Publish an event attributed to a user.
    ///
    /// Same delivery semantics as [`publish`](Self::publish); the
    /// stamped event carries `user_id` so consumers can tell local
    /// optimistic actions apart from relayed ones.
    fn publish_from(&self, user_id: &str, payload: EventPayload) -> Result<usize, InvalidEvent>;

    /// Get the total number of events accepted for delivery.
    fn events_published(&self) -> u64;
}

type Callback = Arc<dyn Fn(&Event) + Send + Sync + 'static>;

/// One registered (kind, callback) pair.
#[derive(Clone)]
pub(crate) struct SubscriberEntry {
    pub(crate) id: u64,
    pub(crate) state: Arc<SubscriptionState>,
    pub(crate) callback: Callback,
}

/// Shared bus state behind the [`EventBus`] handle.
pub(crate) struct BusInner {
    /// Registered subscribers, keyed by event kind.
    registry: RwLock<HashMap<EventKind, Vec<SubscriberEntry>>>,

    /// Serializes deliveries. Reentrant so a callback may publish;
    /// the nested event is delivered depth-first before the enclosing
    /// delivery resumes.
    delivery: ReentrantMutex<()>,

    /// Source of bus-assigned sequence numbers.
    next_seq: AtomicU64,

    /// Source of subscriber ids.
    next_subscriber_id: AtomicU64,

    /// High-water mark keeping event timestamps non-decreasing.
    last_timestamp_ms: AtomicU64,

    /// Total events accepted for delivery.
    events_published: AtomicU64,

    /// Total payloads rejected by validation.
    events_rejected: AtomicU64,

    /// Total callback panics caught during delivery.
    subscriber_panics: AtomicU64,
}

impl BusInner {
    /// Remove a subscriber entry. Called from guard cancellation.
    pub(crate) fn deregister(&self, kind: EventKind, id: u64) {
        let mut registry = self.registry.write();
        if let Some(entries) = registry.get_mut(&kind) {
            entries.retain(|entry| entry.id != id);
            if entries.is_empty() {
                registry.remove(&kind);
            }
        }
    }

    /// Wall-clock milliseconds, clamped against clock regression.
    fn stamp_timestamp(&self) -> u64 {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| {
                u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
            });
        let previous = self.last_timestamp_ms.fetch_max(now_ms, Ordering::Relaxed);
        previous.max(now_ms)
    }
}

/// In-process typed publish/subscribe bus.
///
/// Cheap to clone; all clones share one registry. The bus holds no
/// business state of its own: its only side effect is invoking the
/// callbacks registered at the time of each publish.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a new bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                registry: RwLock::new(HashMap::new()),
                delivery: ReentrantMutex::new(()),
                next_seq: AtomicU64::new(0),
                next_subscriber_id: AtomicU64::new(0),
                last_timestamp_ms: AtomicU64::new(0),
                events_published: AtomicU64::new(0),
                events_rejected: AtomicU64::new(0),
                subscriber_panics: AtomicU64::new(0),
            }),
        }
    }

    /// Register a callback for every future event of `kind`.
    ///
    /// Subscriptions are never deduplicated: subscribing the same
    /// callback twice yields two deliveries per event. The returned
    /// guard cancels the subscription when dropped; a subscriber added
    /// while a publish is in flight does not receive that event.
    #[must_use = "dropping the guard cancels the subscription"]
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriptionGuard
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed) + 1;
        let state = Arc::new(SubscriptionState::new());
        let entry = SubscriberEntry {
            id,
            state: Arc::clone(&state),
            callback: Arc::new(callback),
        };

        self.inner
            .registry
            .write()
            .entry(kind)
            .or_default()
            .push(entry);

        debug!(kind = %kind, subscriber = id, "subscription created");

        SubscriptionGuard::new(Arc::downgrade(&self.inner), kind, id, state)
    }

    /// Get a pull-style stream of events of `kind`.
    ///
    /// The stream buffers up to [`DEFAULT_STREAM_CAPACITY`] undelivered
    /// events; beyond that, new events are dropped for this stream
    /// rather than blocking the publisher.
    #[must_use]
    pub fn event_stream(&self, kind: EventKind) -> EventStream {
        let (tx, rx) = mpsc::channel(DEFAULT_STREAM_CAPACITY);
        let guard = self.subscribe(kind, move |event| {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        kind = %event.kind(),
                        seq = event.seq,
                        "event stream full, dropping event"
                    );
                }
                // Receiver gone; the guard is about to be dropped too.
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        });
        EventStream::new(rx, guard)
    }

    /// Get the number of active subscribers for a kind.
    #[must_use]
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner.registry.read().get(&kind).map_or(0, Vec::len)
    }

    /// Get the number of active subscribers across all kinds.
    #[must_use]
    pub fn total_subscribers(&self) -> usize {
        self.inner.registry.read().values().map(Vec::len).sum()
    }

    /// Get the total number of payloads rejected by validation.
    #[must_use]
    pub fn events_rejected(&self) -> u64 {
        self.inner.events_rejected.load(Ordering::Relaxed)
    }

    /// Get the total number of callback panics caught during delivery.
    #[must_use]
    pub fn subscriber_panics(&self) -> u64 {
        self.inner.subscriber_panics.load(Ordering::Relaxed)
    }

    fn publish_internal(
        &self,
        user_id: Option<String>,
        payload: EventPayload,
    ) -> Result<usize, InvalidEvent> {
        if let Err(e) = payload.validate() {
            self.inner.events_rejected.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "rejecting invalid event");
            return Err(e);
        }
        let kind = payload.kind();

        // One delivery at a time per bus; sequence numbers are assigned
        // under the lock so delivery order matches stamp order.
        let _delivery = self.inner.delivery.lock();

        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let timestamp_ms = self.inner.stamp_timestamp();
        let event = Event {
            seq,
            timestamp_ms,
            user_id,
            payload,
        };

        // Snapshot under the read lock, invoke without it, so callbacks
        // can subscribe or cancel without deadlocking.
        let snapshot: Vec<SubscriberEntry> = self
            .inner
            .registry
            .read()
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        self.inner.events_published.fetch_add(1, Ordering::Relaxed);

        if snapshot.is_empty() {
            warn!(kind = %kind, seq = event.seq, "event delivered to no subscribers");
            return Ok(0);
        }

        let mut delivered = 0;
        for entry in &snapshot {
            // Rechecked per entry: an unsubscribe landing mid-delivery
            // stops invocations from this point on. A cancellation that
            // races the invocation itself may see one final delivery.
            if entry.state.is_cancelled() {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| (entry.callback)(&event))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    self.inner.subscriber_panics.fetch_add(1, Ordering::Relaxed);
                    error!(
                        kind = %kind,
                        seq = event.seq,
                        subscriber = entry.id,
                        "subscriber panicked during delivery"
                    );
                }
            }
        }

        debug!(
            kind = %kind,
            seq = event.seq,
            subscribers = delivered,
            "event delivered"
        );
        Ok(delivered)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, payload: EventPayload) -> Result<usize, InvalidEvent> {
        self.publish_internal(None, payload)
    }

    fn publish_from(&self, user_id: &str, payload: EventPayload) -> Result<usize, InvalidEvent> {
        self.publish_internal(Some(user_id.to_string()), payload)
    }

    fn events_published(&self) -> u64 {
        self.inner.events_published.load(Ordering::Relaxed)
    }
}
