//! Venue API credentials.
//!
//! The client secret is held in a `SecretString` so it never shows up in
//! `Debug` output and is zeroed on drop.

use crate::error::AuthError;
use secrecy::{ExposeSecret, SecretString};

pub const CLIENT_ID_VAR: &str = "CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "CLIENT_SECRET";

#[derive(Clone)]
pub struct ApiCredentials {
    client_id: String,
    client_secret: SecretString,
}

impl ApiCredentials {
    /// Load `CLIENT_ID` / `CLIENT_SECRET`, reading a `.env` file first if present.
    pub fn from_env() -> Result<Self, AuthError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AuthError::MissingEnvVar(key.to_string()))
        };
        Ok(Self::new(read(CLIENT_ID_VAR)?, read(CLIENT_SECRET_VAR)?))
    }

    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret: SecretString::from(client_secret),
        }
    }

    /// Public client id, safe to log.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Only for building the auth request or signing. Never log it.
    pub fn expose_secret(&self) -> &str {
        self.client_secret.expose_secret()
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}
