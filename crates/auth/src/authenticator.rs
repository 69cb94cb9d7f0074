//! Builds the `public/auth` grant and reads the resulting session.

use std::fmt;
use std::str::FromStr;

use protocol::AuthGrant;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::credentials::ApiCredentials;
use crate::error::AuthError;
use crate::signer::RequestSigner;

/// Which grant to use against `public/auth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMethod {
    /// Sends the secret itself.
    #[default]
    ClientCredentials,
    /// Sends an HMAC over a timestamp and nonce; the secret stays local.
    ClientSignature,
}

impl FromStr for AuthMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "client_credentials" | "credentials" => Ok(Self::ClientCredentials),
            "client_signature" | "signature" => Ok(Self::ClientSignature),
            other => Err(format!("unknown auth method: {other}")),
        }
    }
}

/// Produces one grant per connection establishment.
#[derive(Debug, Clone)]
pub struct Authenticator {
    credentials: ApiCredentials,
    method: AuthMethod,
}

impl Authenticator {
    pub fn new(credentials: ApiCredentials, method: AuthMethod) -> Self {
        Self {
            credentials,
            method,
        }
    }

    pub fn method(&self) -> AuthMethod {
        self.method
    }

    pub fn client_id(&self) -> &str {
        self.credentials.client_id()
    }

    /// Build the grant for a fresh auth request.
    pub fn grant(&self, timestamp_ms: i64) -> Result<AuthGrant, AuthError> {
        match self.method {
            AuthMethod::ClientCredentials => Ok(AuthGrant::ClientCredentials {
                client_id: self.credentials.client_id().to_string(),
                client_secret: self.credentials.expose_secret().to_string(),
            }),
            AuthMethod::ClientSignature => {
                let nonce = Uuid::new_v4().as_simple().to_string();
                let signature = RequestSigner::new(&self.credentials).sign_client_signature(
                    timestamp_ms,
                    &nonce,
                    "",
                )?;
                Ok(AuthGrant::ClientSignature {
                    client_id: self.credentials.client_id().to_string(),
                    timestamp: timestamp_ms,
                    nonce,
                    signature,
                })
            }
        }
    }
}

#[derive(Deserialize)]
struct RawSession {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
    #[serde(default)]
    scope: String,
    #[serde(default)]
    token_type: String,
}

/// Session returned by a successful `public/auth`.
pub struct AuthSession {
    access_token: SecretString,
    refresh_token: Option<SecretString>,
    pub expires_in_secs: i64,
    pub scope: String,
    pub token_type: String,
}

impl AuthSession {
    pub fn from_payload(payload: &Value) -> Result<Self, AuthError> {
        let raw = RawSession::deserialize(payload)
            .map_err(|e| AuthError::InvalidSession(e.to_string()))?;
        Ok(Self {
            access_token: SecretString::from(raw.access_token),
            refresh_token: raw.refresh_token.map(SecretString::from),
            expires_in_secs: raw.expires_in,
            scope: raw.scope,
            token_type: raw.token_type,
        })
    }

    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("expires_in_secs", &self.expires_in_secs)
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .finish()
    }
}
