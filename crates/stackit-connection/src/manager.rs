//! # Connection Manager
//!
//! Owns the lifecycle of the realtime link: handshake with a deadline,
//! bounded retries with exponential backoff, and teardown. The manager
//! is a cheap `Clone` handle; every clone shares the same underlying
//! connection, so two widgets calling [`ConnectionManager::connect`]
//! concurrently still produce exactly one handshake.
//!
//! State is published through a `watch` channel. Valid transitions:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected
//!                     |                          ^
//!                     +----------> Error --------+ (via connect/disconnect)
//! ```
//!
//! A lost link goes straight back to `Disconnected`; the manager never
//! redials on its own.

use crate::config::ConnectionConfig;
use crate::transport::{Transport, TransportError, TransportLink};
use parking_lot::Mutex;
use stackit_bus::{EventBus, EventPayload, EventPublisher};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where the connection currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No link and no attempt in flight.
    Disconnected,
    /// A handshake attempt (possibly a retry) is in flight.
    Connecting,
    /// The link is up and feeding the bus.
    Connected,
    /// The last attempt exhausted its retries.
    Error,
}

impl ConnectionState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a [`ConnectionManager::connect`] call did not end connected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Every try failed; `last` is the error from the final one.
    #[error("handshake failed after {attempts} attempt(s): {last}")]
    HandshakeFailed {
        attempts: u32,
        last: TransportError,
    },
    /// `disconnect` was called while the attempt was in flight.
    #[error("connection attempt cancelled by disconnect")]
    Cancelled,
}

/// Latest word on an in-flight attempt; `None` until it resolves.
type AttemptOutcome = Option<Result<(), ConnectionError>>;

struct ManagerInner {
    /// Bumped by `disconnect` and by transport loss. An attempt or
    /// reader whose generation no longer matches must stand down.
    generation: u64,
    /// Present while an attempt is in flight; late `connect` callers
    /// wait on it instead of dialing again.
    attempt: Option<watch::Receiver<AttemptOutcome>>,
    /// Closer for the established link, if any.
    link_closer: Option<watch::Sender<bool>>,
}

struct Shared {
    transport: Arc<dyn Transport>,
    bus: EventBus,
    config: ConnectionConfig,
    state: watch::Sender<ConnectionState>,
    inner: Mutex<ManagerInner>,
}

/// Handle to the shared connection. Clone freely.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, bus: EventBus, config: ConnectionConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                transport,
                bus,
                config,
                state,
                inner: Mutex::new(ManagerInner {
                    generation: 0,
                    attempt: None,
                    link_closer: None,
                }),
            }),
        }
    }

    /// Current state, sampled once.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// A receiver that tracks every state transition.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Bring the link up, retrying per the configured policy.
    ///
    /// Already connected: returns `Ok` without touching the transport.
    /// An attempt already in flight: waits for that attempt's outcome
    /// rather than starting a second handshake.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        enum Role {
            AlreadyConnected,
            Joiner(watch::Receiver<AttemptOutcome>),
            Owner {
                generation: u64,
                outcome: watch::Sender<AttemptOutcome>,
            },
        }

        let role = {
            let mut inner = self.shared.inner.lock();
            if *self.shared.state.borrow() == ConnectionState::Connected {
                Role::AlreadyConnected
            } else if let Some(rx) = &inner.attempt {
                Role::Joiner(rx.clone())
            } else {
                inner.generation += 1;
                let (outcome_tx, outcome_rx) = watch::channel(None);
                inner.attempt = Some(outcome_rx);
                self.shared.state.send_replace(ConnectionState::Connecting);
                Role::Owner {
                    generation: inner.generation,
                    outcome: outcome_tx,
                }
            }
        };

        match role {
            Role::AlreadyConnected => Ok(()),
            Role::Joiner(mut rx) => loop {
                if let Some(outcome) = rx.borrow_and_update().clone() {
                    return outcome;
                }
                if rx.changed().await.is_err() {
                    // The owning call's future was dropped before it
                    // could report. Clear the stale attempt so the
                    // next connect starts fresh.
                    let mut inner = self.shared.inner.lock();
                    let stale = inner
                        .attempt
                        .as_ref()
                        .is_some_and(|a| a.has_changed().is_err());
                    if stale {
                        inner.attempt = None;
                        if *self.shared.state.borrow() == ConnectionState::Connecting {
                            self.shared.state.send_replace(ConnectionState::Disconnected);
                        }
                    }
                    return Err(ConnectionError::Cancelled);
                }
            },
            Role::Owner {
                generation,
                outcome,
            } => {
                let result = self.run_attempt(generation).await;
                {
                    let mut inner = self.shared.inner.lock();
                    if inner.generation == generation {
                        inner.attempt = None;
                    }
                }
                outcome.send_replace(Some(result.clone()));
                result
            }
        }
    }

    /// Tear the connection down. Synchronous and idempotent; also
    /// cancels any attempt in flight.
    pub fn disconnect(&self) {
        let closer = {
            let mut inner = self.shared.inner.lock();
            inner.generation += 1;
            inner.attempt = None;
            inner.link_closer.take()
        };
        if let Some(closer) = closer {
            closer.send_replace(true);
        }
        let previous = self.shared.state.send_replace(ConnectionState::Disconnected);
        if previous != ConnectionState::Disconnected {
            info!(from = %previous, "realtime connection closed");
        }
    }

    /// One full attempt: up to `max_retries + 1` handshakes with
    /// backoff between them.
    async fn run_attempt(&self, generation: u64) -> Result<(), ConnectionError> {
        let attempt_id = Uuid::new_v4();
        let config = &self.shared.config;
        let max_tries = config.max_retries.saturating_add(1);
        let mut last_error: Option<TransportError> = None;

        for try_index in 1..=max_tries {
            if self.cancelled(generation) {
                return Err(ConnectionError::Cancelled);
            }
            if try_index > 1 {
                let delay = backoff_delay(config.backoff_base, config.backoff_cap, try_index);
                debug!(attempt = %attempt_id, try_index, delay = ?delay, "backing off before retry");
                tokio::time::sleep(delay).await;
                if self.cancelled(generation) {
                    return Err(ConnectionError::Cancelled);
                }
            }

            info!(attempt = %attempt_id, try_index, max_tries, "opening realtime link");
            match timeout(config.handshake_timeout, self.shared.transport.connect()).await {
                Ok(Ok(link)) => {
                    if self.install_link(generation, link) {
                        info!(attempt = %attempt_id, try_index, "realtime link established");
                        return Ok(());
                    }
                    return Err(ConnectionError::Cancelled);
                }
                Ok(Err(error)) => {
                    warn!(attempt = %attempt_id, try_index, error = %error, "handshake refused");
                    last_error = Some(error);
                }
                Err(_) => {
                    warn!(
                        attempt = %attempt_id,
                        try_index,
                        deadline = ?config.handshake_timeout,
                        "handshake timed out",
                    );
                    last_error = Some(TransportError::TimedOut);
                }
            }
        }

        if !self.cancelled(generation) {
            self.shared.state.send_replace(ConnectionState::Error);
        }
        Err(ConnectionError::HandshakeFailed {
            attempts: max_tries,
            last: last_error.unwrap_or(TransportError::TimedOut),
        })
    }

    /// Adopt a freshly shaken link, unless a disconnect raced us.
    ///
    /// Returns false (dropping the link, which closes its feed) when
    /// the generation moved on.
    fn install_link(&self, generation: u64, link: TransportLink) -> bool {
        let (initial_online, inbound, closed) = {
            let mut inner = self.shared.inner.lock();
            if inner.generation != generation {
                return false;
            }
            let (initial_online, inbound, closer) = link.into_parts();
            let closed = closer.subscribe();
            inner.link_closer = Some(closer);
            self.shared.state.send_replace(ConnectionState::Connected);
            (initial_online, inbound, closed)
        };

        // Publish outside the lock; a subscriber may call back into
        // the manager.
        if let Err(error) = self
            .shared
            .bus
            .publish(EventPayload::UserOnlineCount {
                count: initial_online,
            })
        {
            warn!(error = %error, "initial online count rejected by the bus");
        }
        tokio::spawn(run_reader(self.shared.clone(), generation, inbound, closed));
        true
    }

    fn cancelled(&self, generation: u64) -> bool {
        self.shared.inner.lock().generation != generation
    }
}

/// Pump inbound transport payloads onto the bus until the link closes
/// or the transport stops feeding it.
async fn run_reader(
    shared: Arc<Shared>,
    generation: u64,
    mut inbound: mpsc::Receiver<EventPayload>,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = closed.changed() => {
                if changed.is_err() || *closed.borrow() {
                    debug!("link closed locally; reader stopping");
                    return;
                }
            }
            received = inbound.recv() => {
                match received {
                    Some(payload) => {
                        if let Err(error) = shared.bus.publish(payload) {
                            warn!(error = %error, "dropping invalid inbound event");
                        }
                    }
                    None => break,
                }
            }
        }
    }

    // The transport went away underneath us.
    let lost = {
        let mut inner = shared.inner.lock();
        if inner.generation == generation {
            inner.generation += 1;
            inner.link_closer = None;
            shared.state.send_replace(ConnectionState::Disconnected);
            true
        } else {
            false
        }
    };
    if lost {
        warn!("transport link lost; connection is offline");
    }
}

/// Delay before handshake number `try_index`; the first retry waits
/// the base, each further retry doubles it, capped.
fn backoff_delay(base: Duration, cap: Duration, try_index: u32) -> Duration {
    let exponent = try_index.saturating_sub(2).min(16);
    base.saturating_mul(1u32 << exponent).min(cap)
}
