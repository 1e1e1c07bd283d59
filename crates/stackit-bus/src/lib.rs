//! # StackIt Bus - Typed Realtime Event Delivery
//!
//! In-process publish/subscribe bus connecting the connection layer to
//! UI-facing consumers. Payloads are a closed tagged enum, so every
//! event's shape is fixed by its kind at compile time.
//!
//! ## Delivery Model
//!
//! ```text
//! ┌─────────────────┐                       ┌──────────────────┐
//! │ Connection      │                       │ Derived-state    │
//! │ Manager         │      publish()        │ hooks / UI       │
//! │ (or local vote) │ ──────┐               │                  │
//! └─────────────────┘       │               └──────────────────┘
//!                           ▼                        ↑
//!                    ┌──────────────┐                │
//!                    │  Event Bus   │ ───────────────┘
//!                    │  (per kind)  │   subscribe(kind, callback)
//!                    └──────────────┘
//! ```
//!
//! - `publish` stamps a strictly-increasing sequence number and
//!   delivers synchronously, in subscription order
//! - a panicking subscriber is isolated and reported, never propagated
//!   to the publisher
//! - dropping a [`SubscriptionGuard`] cancels its subscription, so
//!   consumers cannot leak callbacks

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bus;
pub mod events;
pub mod subscriber;

// Re-export main types
pub use bus::{EventBus, EventPublisher};
pub use events::{Event, EventKind, EventPayload, InvalidEvent, ItemKind};
pub use subscriber::{EventStream, SubscriptionError, SubscriptionGuard};

/// Events buffered per [`EventStream`] before new ones are dropped.
pub const DEFAULT_STREAM_CAPACITY: usize = 256;
