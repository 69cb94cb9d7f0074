//! Session configuration.
//!
//! Values come from the process environment, optionally seeded from a `.env`
//! file. Every field has a default so an empty environment yields a usable
//! testnet configuration.

use std::time::Duration;

use thiserror::Error;

use crate::environment::{DeribitEnvironment, ParseEnvironmentError};

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    InvalidNumber { key: &'static str, value: String },

    #[error(transparent)]
    Environment(#[from] ParseEnvironmentError),
}

/// Reconnection schedule for the WebSocket adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of each delay used as random spread, clamped to `[0, 1]`.
    pub jitter: f64,
    /// Give up after this many consecutive failures. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: 0.1,
            max_attempts: None,
        }
    }
}

/// Settings shared by the order manager and the connection adapter.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub environment: DeribitEnvironment,
    /// In-flight requests older than this are reaped as timed out.
    pub request_timeout: Duration,
    /// How often the ledger is swept for timed out requests.
    pub reap_interval: Duration,
    /// Venue heartbeat interval. `None` leaves heartbeats off.
    pub heartbeat_interval: Option<Duration>,
    /// Channels subscribed after every successful authentication.
    pub channels: Vec<String>,
    pub reconnect: ReconnectPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            environment: DeribitEnvironment::default(),
            request_timeout: Duration::from_secs(10),
            reap_interval: Duration::from_secs(1),
            heartbeat_interval: Some(Duration::from_secs(30)),
            channels: Vec::new(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from the environment, reading `.env` first when present.
    ///
    /// Recognized keys: `DERIBIT_ENVIRONMENT`, `ORDER_REQUEST_TIMEOUT_MS`,
    /// `ORDER_REAP_INTERVAL_MS`, `DERIBIT_HEARTBEAT_SECS` (0 disables),
    /// `DERIBIT_CHANNELS` (comma separated).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Used by [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("DERIBIT_ENVIRONMENT") {
            config.environment = value.parse()?;
        }
        if let Some(ms) = read_u64(&lookup, "ORDER_REQUEST_TIMEOUT_MS")? {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = read_u64(&lookup, "ORDER_REAP_INTERVAL_MS")? {
            config.reap_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(secs) = read_u64(&lookup, "DERIBIT_HEARTBEAT_SECS")? {
            config.heartbeat_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(list) = lookup("DERIBIT_CHANNELS") {
            config.channels = list
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect();
        }

        Ok(config)
    }

    pub fn with_environment(mut self, environment: DeribitEnvironment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_heartbeat(mut self, interval: Option<Duration>) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}

fn read_u64<F>(lookup: &F, key: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
    }
}
