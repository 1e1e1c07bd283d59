//! # Realtime Context
//!
//! Process-wide composition root. Owns the bus, the connection
//! manager, and the app-level folds (online count, notifications), so
//! every widget in the process shares one connection and one event
//! stream. Create it once, `start` it, hand out handles, `shutdown`
//! when the app leaves.
//!
//! Internal subscriptions are installed before the first handshake, so
//! the initial presence figure published on connect is never missed.

use crate::config::RuntimeConfig;
use crate::live::{advance, cast_vote, LiveOnlineCount, LiveVoteCount};
use crate::notify::{notification_for, LogNotifier, NotificationSink};
use parking_lot::Mutex;
use stackit_bus::{
    EventBus, EventKind, EventPayload, EventPublisher, EventStream, InvalidEvent, ItemKind,
    SubscriptionGuard,
};
use stackit_connection::{
    ConnectionConfig, ConnectionError, ConnectionManager, ConnectionState, SimulatedTransport,
    Transport,
};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Event kinds that can surface as notifications.
const NOTIFY_KINDS: [EventKind; 4] = [
    EventKind::NewAnswer,
    EventKind::NewQuestion,
    EventKind::Mention,
    EventKind::SystemMessage,
];

/// The one realtime hub an application process holds.
pub struct RealtimeContext {
    bus: EventBus,
    manager: ConnectionManager,
    online_tx: Arc<watch::Sender<u32>>,
    sink: Arc<dyn NotificationSink>,
    internal: Mutex<Vec<SubscriptionGuard>>,
}

impl RealtimeContext {
    /// Standard wiring: simulated transport, notifications to the log.
    #[must_use]
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_parts(
            config.connection,
            Arc::new(SimulatedTransport::new(config.simulation)),
            Arc::new(LogNotifier),
        )
    }

    /// Custom wiring; how tests plug in scripted transports and
    /// capturing sinks.
    #[must_use]
    pub fn with_parts(
        connection: ConnectionConfig,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let bus = EventBus::new();
        let manager = ConnectionManager::new(transport, bus.clone(), connection);
        let (online_tx, _) = watch::channel(0);
        Self {
            bus,
            manager,
            online_tx: Arc::new(online_tx),
            sink,
            internal: Mutex::new(Vec::new()),
        }
    }

    /// Install the app-level folds and bring the connection up.
    ///
    /// On error the process keeps working offline: local publishes
    /// still reach local subscribers.
    pub async fn start(&self) -> Result<(), ConnectionError> {
        self.install_internal_subscriptions();
        self.manager.connect().await
    }

    /// Cancel the app-level folds and drop the connection. Idempotent.
    pub fn shutdown(&self) {
        let guards: Vec<SubscriptionGuard> = {
            let mut internal = self.internal.lock();
            internal.drain(..).collect()
        };
        drop(guards);
        self.manager.disconnect();
        info!("realtime context shut down");
    }

    fn install_internal_subscriptions(&self) {
        let mut internal = self.internal.lock();
        if !internal.is_empty() {
            return;
        }

        let tx = Arc::clone(&self.online_tx);
        let last_seq = AtomicU64::new(0);
        internal.push(self.bus.subscribe(EventKind::UserOnlineCount, move |event| {
            if let EventPayload::UserOnlineCount { count } = &event.payload {
                if advance(&last_seq, event.seq) {
                    tx.send_replace(*count);
                }
            }
        }));

        for kind in NOTIFY_KINDS {
            let sink = Arc::clone(&self.sink);
            internal.push(self.bus.subscribe(kind, move |event| {
                if let Some(notification) = notification_for(event) {
                    sink.notify(notification);
                }
            }));
        }
    }

    /// The shared bus, for consumers that want it directly.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Subscribe a callback; dropping the guard unsubscribes.
    #[must_use = "dropping the guard cancels the subscription"]
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriptionGuard
    where
        F: Fn(&stackit_bus::Event) + Send + Sync + 'static,
    {
        self.bus.subscribe(kind, callback)
    }

    /// Async adapter over one event kind.
    #[must_use]
    pub fn event_stream(&self, kind: EventKind) -> EventStream {
        self.bus.event_stream(kind)
    }

    /// Vote counter hook for one question or answer.
    #[must_use]
    pub fn live_votes(&self, item_id: impl Into<String>, initial: i64) -> LiveVoteCount {
        LiveVoteCount::new(&self.bus, item_id, initial)
    }

    /// Standalone presence hook; independent of [`Self::online_count`].
    #[must_use]
    pub fn live_online(&self) -> LiveOnlineCount {
        LiveOnlineCount::new(&self.bus)
    }

    /// Optimistic vote on behalf of `user_id`.
    pub fn cast_vote(
        &self,
        user_id: &str,
        item_id: impl Into<String>,
        item_kind: ItemKind,
        new_vote_count: i64,
    ) -> Result<usize, InvalidEvent> {
        cast_vote(&self.bus, user_id, item_id, item_kind, new_vote_count)
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    #[must_use]
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.manager.watch_state()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    /// Latest presence figure the app-level fold has applied; zero
    /// before the first one arrives.
    #[must_use]
    pub fn online_count(&self) -> u32 {
        *self.online_tx.borrow()
    }

    #[must_use]
    pub fn watch_online(&self) -> watch::Receiver<u32> {
        self.online_tx.subscribe()
    }
}

impl EventPublisher for RealtimeContext {
    fn publish(&self, payload: EventPayload) -> Result<usize, InvalidEvent> {
        self.bus.publish(payload)
    }

    fn publish_from(&self, user_id: &str, payload: EventPayload) -> Result<usize, InvalidEvent> {
        self.bus.publish_from(user_id, payload)
    }

    fn events_published(&self) -> u64 {
        self.bus.events_published()
    }
}
