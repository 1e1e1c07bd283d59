//! # Integration Flows
//!
//! Cross-crate tests: every flow here goes through at least two of
//! stackit-bus, stackit-connection, and stackit-runtime, wired the
//! way the application wires them.

pub mod bus_delivery;
pub mod connection_lifecycle;
pub mod live_values;
