//! # Live Values
//!
//! Small derived-state handles a widget keeps while it is on screen.
//! Each one owns a bus subscription and folds matching events into a
//! `watch` channel; dropping the handle unhooks it. A monotonic
//! sequence guard makes the fold idempotent: an event older than, or
//! the same age as, the newest one applied is ignored, so replays and
//! out-of-order arrivals cannot walk a value backwards.

use stackit_bus::{
    EventBus, EventKind, EventPayload, EventPublisher, InvalidEvent, ItemKind, SubscriptionGuard,
};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// True when `seq` is strictly newer than everything applied so far,
/// claiming it in the same step.
pub(crate) fn advance(last: &AtomicU64, seq: u64) -> bool {
    last.fetch_max(seq, Ordering::AcqRel) < seq
}

/// Live vote count for one question or answer.
pub struct LiveVoteCount {
    rx: watch::Receiver<i64>,
    _guard: SubscriptionGuard,
}

impl LiveVoteCount {
    /// Track `item_id`, starting from the count currently rendered.
    #[must_use]
    pub fn new(bus: &EventBus, item_id: impl Into<String>, initial: i64) -> Self {
        let item_id = item_id.into();
        let (tx, rx) = watch::channel(initial);
        let last_seq = AtomicU64::new(0);
        let guard = bus.subscribe(EventKind::VoteUpdate, move |event| {
            if let EventPayload::VoteUpdate {
                item_id: event_item,
                new_vote_count,
                ..
            } = &event.payload
            {
                if *event_item == item_id && advance(&last_seq, event.seq) {
                    tx.send_replace(*new_vote_count);
                }
            }
        });
        Self { rx, _guard: guard }
    }

    /// Current count.
    #[must_use]
    pub fn value(&self) -> i64 {
        *self.rx.borrow()
    }

    /// Receiver that wakes on every applied update.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<i64> {
        self.rx.clone()
    }
}

/// Live "users online" figure for the whole site.
pub struct LiveOnlineCount {
    rx: watch::Receiver<u32>,
    _guard: SubscriptionGuard,
}

impl LiveOnlineCount {
    /// Starts at zero and follows presence events as they arrive.
    #[must_use]
    pub fn new(bus: &EventBus) -> Self {
        let (tx, rx) = watch::channel(0);
        let last_seq = AtomicU64::new(0);
        let guard = bus.subscribe(EventKind::UserOnlineCount, move |event| {
            if let EventPayload::UserOnlineCount { count } = &event.payload {
                if advance(&last_seq, event.seq) {
                    tx.send_replace(*count);
                }
            }
        });
        Self { rx, _guard: guard }
    }

    #[must_use]
    pub fn value(&self) -> u32 {
        *self.rx.borrow()
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<u32> {
        self.rx.clone()
    }
}

/// Publish an optimistic vote on behalf of `user_id`.
///
/// The caller has already updated its own widget; this tells everyone
/// else, including other hooks in the same process.
pub fn cast_vote(
    publisher: &dyn EventPublisher,
    user_id: &str,
    item_id: impl Into<String>,
    item_kind: ItemKind,
    new_vote_count: i64,
) -> Result<usize, InvalidEvent> {
    publisher.publish_from(
        user_id,
        EventPayload::VoteUpdate {
            item_id: item_id.into(),
            item_kind,
            new_vote_count,
        },
    )
}
