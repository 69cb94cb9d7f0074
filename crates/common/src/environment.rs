//! Deribit environment selection.

use std::fmt;
use std::str::FromStr;

/// Venue environment the session connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeribitEnvironment {
    /// Live venue, real funds.
    Production,
    /// Test venue. Default so that an unconfigured run never trades live.
    #[default]
    Testnet,
}

impl DeribitEnvironment {
    /// JSON-RPC over WebSocket endpoint.
    pub fn ws_url(&self) -> &'static str {
        match self {
            Self::Production => "wss://www.deribit.com/ws/api/v2",
            Self::Testnet => "wss://test.deribit.com/ws/api/v2",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Read `DERIBIT_ENVIRONMENT`, falling back to testnet when unset or invalid.
    pub fn from_env() -> Self {
        std::env::var("DERIBIT_ENVIRONMENT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for DeribitEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Testnet => write!(f, "testnet"),
        }
    }
}

impl FromStr for DeribitEnvironment {
    type Err = ParseEnvironmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" | "mainnet" | "live" => Ok(Self::Production),
            "testnet" | "test" => Ok(Self::Testnet),
            _ => Err(ParseEnvironmentError(s.to_string())),
        }
    }
}

/// Unrecognized environment name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnvironmentError(String);

impl fmt::Display for ParseEnvironmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid environment '{}', expected 'production' or 'testnet'",
            self.0
        )
    }
}

impl std::error::Error for ParseEnvironmentError {}
