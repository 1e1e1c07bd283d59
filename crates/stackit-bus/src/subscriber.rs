//! # Subscription Handles
//!
//! Cancellation guards for registered callbacks and a pull-style
//! stream adapter for consumers that prefer iteration over callbacks.

use crate::bus::BusInner;
use crate::events::{Event, EventKind};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::debug;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The event bus was dropped or the subscription was cancelled.
    #[error("event bus closed")]
    Closed,
}

/// Shared cancellation flag between a guard and the bus registry.
///
/// Delivery checks the flag immediately before each invocation, so a
/// cancellation is visible even while the cancelled entry still sits
/// in an in-flight delivery snapshot.
pub(crate) struct SubscriptionState {
    cancelled: AtomicBool,
}

impl SubscriptionState {
    pub(crate) fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns true only for the call that flipped the flag.
    fn mark_cancelled(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }
}

/// Handle for one registered subscription.
///
/// Cancellation is a scoped resource: dropping the guard cancels the
/// subscription on every exit path of the owning consumer. Explicit
/// [`cancel`](Self::cancel) is available for early release and is
/// idempotent.
///
/// The guard holds only a weak reference to the bus, so outstanding
/// guards never keep a dropped bus alive.
#[must_use = "dropping the guard cancels the subscription"]
pub struct SubscriptionGuard {
    bus: Weak<BusInner>,
    kind: EventKind,
    id: u64,
    state: Arc<SubscriptionState>,
}

impl SubscriptionGuard {
    pub(crate) fn new(
        bus: Weak<BusInner>,
        kind: EventKind,
        id: u64,
        state: Arc<SubscriptionState>,
    ) -> Self {
        Self {
            bus,
            kind,
            id,
            state,
        }
    }

    /// Cancel the subscription.
    ///
    /// Takes effect no later than the next publish: deliveries the bus
    /// has not yet started skip this subscriber, and an in-flight
    /// delivery stops invoking it from its next check on. Calling this
    /// more than once has no further effect.
    pub fn cancel(&self) {
        if !self.state.mark_cancelled() {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            bus.deregister(self.kind, self.id);
        }
        debug!(kind = %self.kind, subscriber = self.id, "subscription cancelled");
    }

    /// Whether the subscription still receives events.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.state.is_cancelled()
    }

    /// The kind this subscription was registered for.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// A pull-style stream over one event kind.
///
/// Backed by a subscription whose callback forwards events into a
/// bounded channel; the subscription is cancelled when the stream is
/// dropped. Implements [`tokio_stream::Stream`] for use with stream
/// combinators.
pub struct EventStream {
    receiver: mpsc::Receiver<Event>,
    guard: SubscriptionGuard,
}

impl EventStream {
    pub(crate) fn new(receiver: mpsc::Receiver<Event>, guard: SubscriptionGuard) -> Self {
        Self { receiver, guard }
    }

    /// Receive the next event.
    ///
    /// # Returns
    ///
    /// - `Some(event)` - The next buffered event
    /// - `None` - The bus was dropped and the buffer is drained
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Try to receive the next event without waiting.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(event))` - An event was buffered
    /// - `Ok(None)` - Nothing buffered right now
    /// - `Err(SubscriptionError::Closed)` - The bus was dropped and
    ///   the buffer is drained
    pub fn try_recv(&mut self) -> Result<Option<Event>, SubscriptionError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(SubscriptionError::Closed),
        }
    }

    /// The kind this stream yields.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.guard.kind()
    }
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
