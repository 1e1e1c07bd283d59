//! # StackIt Runtime - Realtime Composition Root
//!
//! Ties the workspace together for an application process: one
//! [`RealtimeContext`] owning the bus and the connection, plus the
//! widget-facing pieces built on top of it. [`LiveVoteCount`] and
//! [`LiveOnlineCount`] fold events into values a view can render;
//! [`notify`] turns events into toasts; [`config`] reads the
//! `STACKIT_*` environment.
//!
//! The `stackit-node` binary in this crate is a small demo host: it
//! wires a context to the simulated transport and logs what a UI
//! would show.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod config;
pub mod context;
pub mod live;
pub mod notify;

// Re-export main types
pub use config::RuntimeConfig;
pub use context::RealtimeContext;
pub use live::{cast_vote, LiveOnlineCount, LiveVoteCount};
pub use notify::{notification_for, LogNotifier, Notification, NotificationSink};
