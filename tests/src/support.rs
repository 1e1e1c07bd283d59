//! Shared fixtures for the integration suite: a transport whose
//! handshakes follow a script, a notification sink that records
//! instead of showing, and small awaiting helpers.

use async_trait::async_trait;
use parking_lot::Mutex;
use stackit_bus::EventPayload;
use stackit_connection::{
    ConnectionManager, ConnectionState, Transport, TransportError, TransportLink,
};
use stackit_runtime::{Notification, NotificationSink};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

/// What the next `connect` call should do.
pub enum ScriptedOutcome {
    /// Handshake succeeds with this initial presence figure.
    Accept { initial_online: u32 },
    /// Handshake is refused outright.
    Refuse,
    /// Handshake never answers; pair with a short timeout.
    Hang,
}

/// Transport whose handshakes follow a script, in order. Once the
/// script runs out every further call refuses.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<ScriptedOutcome>>,
    connect_calls: AtomicU32,
    handshake_delay: Duration,
    feed: Mutex<Option<mpsc::Sender<EventPayload>>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<ScriptedOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            connect_calls: AtomicU32::new(0),
            handshake_delay: Duration::ZERO,
            feed: Mutex::new(None),
        }
    }

    /// Make every handshake take this long before resolving.
    #[must_use]
    pub fn with_handshake_delay(mut self, delay: Duration) -> Self {
        self.handshake_delay = delay;
        self
    }

    /// Handshakes attempted so far.
    pub fn connect_count(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Push a payload through the live link's feed.
    pub async fn push_inbound(&self, payload: EventPayload) {
        let sender = self.feed.lock().clone().expect("no live link to feed");
        sender.send(payload).await.expect("link receiver gone");
    }

    /// Drop the feed sender, the way a transport that died would.
    pub fn drop_feed(&self) {
        *self.feed.lock() = None;
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self) -> Result<TransportLink, TransportError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if !self.handshake_delay.is_zero() {
            tokio::time::sleep(self.handshake_delay).await;
        }
        let outcome = self.script.lock().pop_front();
        match outcome {
            Some(ScriptedOutcome::Accept { initial_online }) => {
                let (feed_tx, inbound) = mpsc::channel(32);
                *self.feed.lock() = Some(feed_tx);
                let (closer, _watch) = watch::channel(false);
                Ok(TransportLink::new(initial_online, inbound, closer))
            }
            Some(ScriptedOutcome::Hang) => std::future::pending().await,
            Some(ScriptedOutcome::Refuse) | None => Err(TransportError::Refused {
                reason: "scripted refusal".to_string(),
            }),
        }
    }
}

/// Sink that records notifications instead of showing them.
#[derive(Default)]
pub struct CapturingNotifier {
    notes: Mutex<Vec<Notification>>,
}

impl CapturingNotifier {
    pub fn titles(&self) -> Vec<String> {
        self.notes.lock().iter().map(|n| n.title.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.notes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.lock().is_empty()
    }
}

impl NotificationSink for CapturingNotifier {
    fn notify(&self, notification: Notification) {
        self.notes.lock().push(notification);
    }
}

/// Wait until the manager reports `target`, or panic after a second.
pub async fn wait_for_state(manager: &ConnectionManager, target: ConnectionState) {
    let mut rx = manager.watch_state();
    let reached = timeout(Duration::from_secs(1), async {
        while *rx.borrow_and_update() != target {
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for state {target}");
}

/// Poll `predicate` until it holds, or panic after a second.
pub async fn wait_until(what: &str, mut predicate: impl FnMut() -> bool) {
    let held = timeout(Duration::from_secs(1), async {
        while !predicate() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(held.is_ok(), "timed out waiting until {what}");
}
