//! # Connection Configuration
//!
//! Tunables for the connection manager and the simulated transport.
//! All durations have sane defaults with override capability; the
//! runtime layer maps environment variables onto these structs.

use std::ops::RangeInclusive;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A duration that bounds an operation was zero.
    #[error("{field} must be greater than zero")]
    ZeroDuration {
        /// Name of the offending field.
        field: &'static str,
    },

    /// The backoff cap is below the backoff base.
    #[error("backoff cap {cap_ms}ms is below backoff base {base_ms}ms")]
    BackoffCapBelowBase {
        /// Configured base, in milliseconds.
        base_ms: u128,
        /// Configured cap, in milliseconds.
        cap_ms: u128,
    },

    /// The online band is inverted.
    #[error("online floor {floor} exceeds ceiling {ceiling}")]
    InvertedOnlineBand {
        /// Configured lower bound.
        floor: u32,
        /// Configured upper bound.
        ceiling: u32,
    },

    /// The initial online range falls outside the online band.
    #[error("initial online range {start}..={end} leaves the band {floor}..={ceiling}")]
    InitialOnlineOutsideBand {
        /// Start of the initial range.
        start: u32,
        /// End of the initial range.
        end: u32,
        /// Band lower bound.
        floor: u32,
        /// Band upper bound.
        ceiling: u32,
    },
}

/// Tunables for connection attempts.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Bound on a single handshake, including the transport's own
    /// delays. A handshake that has not resolved by then counts as
    /// failed.
    pub handshake_timeout: Duration,
    /// Retries after the first failed handshake before the attempt
    /// surfaces an error.
    pub max_retries: u32,
    /// Backoff before the first retry; doubles per retry.
    pub backoff_base: Duration,
    /// Upper bound on the backoff between retries.
    pub backoff_cap: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            max_retries: 3,
            backoff_base: Duration::from_millis(250),
            backoff_cap: Duration::from_secs(5),
        }
    }
}

impl ConnectionConfig {
    /// Millisecond-scale timings for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            handshake_timeout: Duration::from_millis(50),
            max_retries: 1,
            backoff_base: Duration::from_millis(5),
            backoff_cap: Duration::from_millis(20),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.handshake_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "handshake_timeout",
            });
        }
        if self.backoff_base.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "backoff_base",
            });
        }
        if self.backoff_cap < self.backoff_base {
            return Err(ConfigError::BackoffCapBelowBase {
                base_ms: self.backoff_base.as_millis(),
                cap_ms: self.backoff_cap.as_millis(),
            });
        }
        Ok(())
    }
}

/// Tunables for the simulated transport.
///
/// Defaults reproduce the behavior of the mock client the application
/// shipped with: a one-second handshake, an initial audience of 10-59
/// users, a presence walk of at most two users every ten seconds
/// bounded to 5-100, and one random domain event every fifteen
/// seconds.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Artificial handshake latency.
    pub handshake_delay: Duration,
    /// Range the initial online count is drawn from.
    pub initial_online: RangeInclusive<u32>,
    /// Interval between presence updates.
    pub presence_interval: Duration,
    /// Largest single presence step, in users.
    pub presence_step: u32,
    /// Lower bound of the online band.
    pub online_floor: u32,
    /// Upper bound of the online band.
    pub online_ceiling: u32,
    /// Interval between simulated domain events.
    pub activity_interval: Duration,
    /// Fixed RNG seed; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            handshake_delay: Duration::from_secs(1),
            initial_online: 10..=59,
            presence_interval: Duration::from_secs(10),
            presence_step: 2,
            online_floor: 5,
            online_ceiling: 100,
            activity_interval: Duration::from_secs(15),
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Millisecond-scale timings and a fixed seed for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            handshake_delay: Duration::from_millis(1),
            initial_online: 10..=59,
            presence_interval: Duration::from_millis(10),
            presence_step: 2,
            online_floor: 5,
            online_ceiling: 100,
            activity_interval: Duration::from_millis(15),
            seed: Some(7),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.presence_interval.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "presence_interval",
            });
        }
        if self.activity_interval.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "activity_interval",
            });
        }
        if self.online_floor > self.online_ceiling {
            return Err(ConfigError::InvertedOnlineBand {
                floor: self.online_floor,
                ceiling: self.online_ceiling,
            });
        }
        let (start, end) = (*self.initial_online.start(), *self.initial_online.end());
        if start < self.online_floor || end > self.online_ceiling || start > end {
            return Err(ConfigError::InitialOnlineOutsideBand {
                start,
                end,
                floor: self.online_floor,
                ceiling: self.online_ceiling,
            });
        }
        Ok(())
    }
}
