//! # Transport Boundary
//!
//! The interface the connection manager requires from an underlying
//! transport. The wire protocol is not defined here; the bundled
//! [`SimulatedTransport`](crate::simulated::SimulatedTransport) stands
//! in for a real network client, and tests script their own.

use async_trait::async_trait;
use stackit_bus::EventPayload;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Errors from transport operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The remote side refused the handshake.
    #[error("handshake refused: {reason}")]
    Refused {
        /// Why the handshake was refused.
        reason: String,
    },

    /// The transport could not be reached at all.
    #[error("transport unavailable: {reason}")]
    Unavailable {
        /// Why the transport was unreachable.
        reason: String,
    },

    /// The handshake did not complete within the configured bound.
    ///
    /// Produced by the connection manager when its timeout elapses
    /// before the transport resolves.
    #[error("handshake timed out")]
    TimedOut,
}

/// Abstract interface for establishing a realtime connection.
///
/// One `connect` call performs one handshake. Retries, timeouts, and
/// state bookkeeping belong to the connection manager, not to
/// implementations of this trait.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the manager shares one
/// instance across connection attempts.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one handshake with the remote source.
    ///
    /// Resolves with a live [`TransportLink`] on success. The future
    /// may be dropped by the manager when its handshake timeout
    /// elapses; implementations must tolerate cancellation at any
    /// await point.
    async fn connect(&self) -> Result<TransportLink, TransportError>;
}

/// The live product of a successful handshake.
///
/// Carries the handshake's initial presence snapshot, the inbound
/// message stream, and a close handle. The transport's background
/// activity watches `closer`: an explicit [`close`](Self::close) sends
/// the stop signal, and dropping the link closes the channel outright.
/// Either way the activity ends.
pub struct TransportLink {
    initial_online: u32,
    inbound: mpsc::Receiver<EventPayload>,
    closer: watch::Sender<bool>,
}

impl TransportLink {
    /// Assemble a link from its parts.
    ///
    /// `closer` is the shutdown signal for the transport's background
    /// tasks. Implementations must stop when it turns `true` or when
    /// the channel closes.
    #[must_use]
    pub fn new(
        initial_online: u32,
        inbound: mpsc::Receiver<EventPayload>,
        closer: watch::Sender<bool>,
    ) -> Self {
        Self {
            initial_online,
            inbound,
            closer,
        }
    }

    /// The online-user count reported by the handshake.
    #[must_use]
    pub fn initial_online(&self) -> u32 {
        self.initial_online
    }

    /// Signal the transport to stop this link's background activity.
    ///
    /// Safe to call more than once; never suspends.
    pub fn close(&self) {
        self.closer.send_replace(true);
        debug!("transport link closed");
    }

    /// Split the link for installation into the manager.
    pub(crate) fn into_parts(self) -> (u32, mpsc::Receiver<EventPayload>, watch::Sender<bool>) {
        (self.initial_online, self.inbound, self.closer)
    }
}
