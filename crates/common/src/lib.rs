//! Shared plumbing for the order tracking workspace.
//!
//! - **Logging**: [`init_logging`] installs the `tracing` subscriber
//! - **Environment**: [`DeribitEnvironment`] selects production or testnet
//! - **Configuration**: [`SessionConfig`] loaded from env / `.env`
//! - **Backoff**: [`ReconnectBackoff`] for connection retries

mod backoff;
mod config;
mod environment;

pub use backoff::ReconnectBackoff;
pub use config::{ConfigError, ReconnectPolicy, SessionConfig};
pub use environment::{DeribitEnvironment, ParseEnvironmentError};

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// Honors `RUST_LOG`; falls back to `info` when it is unset or invalid.
/// Calling this twice is harmless, the second install is ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
