//! # StackIt Connection - Realtime Link Lifecycle
//!
//! Connects the event bus to a transport and keeps the link's state
//! machine honest. The [`ConnectionManager`] dials through a
//! [`Transport`], enforces a handshake deadline, retries with
//! exponential backoff, and pumps everything the transport sends into
//! the bus. Consumers watch the state, they never drive it.
//!
//! ## Lifecycle
//!
//! ```text
//!              connect()                   handshake ok
//! Disconnected ──────────► Connecting ──────────────────► Connected
//!      ▲                       │                              │
//!      │                       │ retries exhausted            │ disconnect()
//!      │ connect()             ▼                              │ or link lost
//!      └────────────────────  Error ◄─────┐                   │
//!      └──────────────────────────────────┴───────────────────┘
//! ```
//!
//! The bundled [`SimulatedTransport`] stands in for a real network
//! client: handshake delay, presence walk, and random Q&A activity,
//! seedable for deterministic tests.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod config;
pub mod manager;
pub mod simulated;
pub mod transport;

// Re-export main types
pub use config::{ConfigError, ConnectionConfig, SimulationConfig};
pub use manager::{ConnectionError, ConnectionManager, ConnectionState};
pub use simulated::SimulatedTransport;
pub use transport::{Transport, TransportError, TransportLink};

/// Payloads buffered between a transport link and the bus reader.
pub const INBOUND_CHANNEL_CAPACITY: usize = 64;
