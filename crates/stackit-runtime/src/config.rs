//! # Runtime Configuration
//!
//! One struct covering both the connection policy and the simulated
//! feed, with environment overrides. All knobs have sane defaults;
//! overrides that fail validation are dropped as a block rather than
//! half-applied.

use stackit_connection::{ConfigError, ConnectionConfig, SimulationConfig};
use std::time::Duration;
use tracing::warn;

/// Complete runtime configuration.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// Handshake, retry, and backoff policy.
    pub connection: ConnectionConfig,
    /// Simulated transport tunables.
    pub simulation: SimulationConfig,
}

impl RuntimeConfig {
    /// Defaults with `STACKIT_*` environment overrides applied.
    ///
    /// Unparseable values are ignored with a warning. If the combined
    /// result fails validation the whole override set is discarded.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = env_parse::<u64>("STACKIT_HANDSHAKE_TIMEOUT_MS") {
            config.connection.handshake_timeout = Duration::from_millis(ms);
        }
        if let Some(retries) = env_parse::<u32>("STACKIT_MAX_RETRIES") {
            config.connection.max_retries = retries;
        }
        if let Some(ms) = env_parse::<u64>("STACKIT_BACKOFF_BASE_MS") {
            config.connection.backoff_base = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("STACKIT_BACKOFF_CAP_MS") {
            config.connection.backoff_cap = Duration::from_millis(ms);
        }

        if let Some(ms) = env_parse::<u64>("STACKIT_HANDSHAKE_DELAY_MS") {
            config.simulation.handshake_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("STACKIT_PRESENCE_INTERVAL_MS") {
            config.simulation.presence_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("STACKIT_ACTIVITY_INTERVAL_MS") {
            config.simulation.activity_interval = Duration::from_millis(ms);
        }
        if let Some(floor) = env_parse::<u32>("STACKIT_ONLINE_FLOOR") {
            config.simulation.online_floor = floor;
        }
        if let Some(ceiling) = env_parse::<u32>("STACKIT_ONLINE_CEILING") {
            config.simulation.online_ceiling = ceiling;
        }
        if let Some(seed) = env_parse::<u64>("STACKIT_SIM_SEED") {
            config.simulation.seed = Some(seed);
        }

        if let Err(error) = config.validate() {
            warn!(error = %error, "environment overrides rejected; using defaults");
            return Self::default();
        }
        config
    }

    /// Check both halves for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.connection.validate()?;
        self.simulation.validate()?;
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}
