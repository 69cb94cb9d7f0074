use thiserror::Error;

/// Errors that can occur during authentication operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// A required environment variable is missing.
    #[error("missing environment variable: {0}")]
    MissingEnvVar(String),

    /// The secret cannot be used as an HMAC key.
    #[error("invalid signing key")]
    InvalidKey,

    /// The `public/auth` result did not look like a session.
    #[error("invalid auth result: {0}")]
    InvalidSession(String),
}
