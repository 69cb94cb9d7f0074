//! Credentials and the venue authentication handshake.
//!
//! - **Credentials**: `CLIENT_ID` / `CLIENT_SECRET` from the environment or a
//!   `.env` file, with the secret wrapped in `SecretString`.
//! - **Signing**: HMAC-SHA256 for the `client_signature` grant.
//! - **Authenticator**: builds the `public/auth` grant once per connection
//!   and parses the returned session.

mod authenticator;
mod credentials;
mod error;
mod signer;

pub use authenticator::{AuthMethod, AuthSession, Authenticator};
pub use credentials::{ApiCredentials, CLIENT_ID_VAR, CLIENT_SECRET_VAR};
pub use error::AuthError;
pub use signer::RequestSigner;
