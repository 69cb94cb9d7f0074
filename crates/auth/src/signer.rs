//! HMAC-SHA256 signing for the `client_signature` grant.

use crate::credentials::ApiCredentials;
use crate::error::AuthError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub struct RequestSigner<'a> {
    credentials: &'a ApiCredentials,
}

impl<'a> RequestSigner<'a> {
    pub fn new(credentials: &'a ApiCredentials) -> Self {
        Self { credentials }
    }

    /// Lowercase hex HMAC-SHA256 of `message` keyed by the client secret.
    pub fn sign(&self, message: &str) -> Result<String, AuthError> {
        let mut mac = HmacSha256::new_from_slice(self.credentials.expose_secret().as_bytes())
            .map_err(|_| AuthError::InvalidKey)?;
        mac.update(message.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Signature over `timestamp\nnonce\ndata`.
    pub fn sign_client_signature(
        &self,
        timestamp_ms: i64,
        nonce: &str,
        data: &str,
    ) -> Result<String, AuthError> {
        self.sign(&format!("{timestamp_ms}\n{nonce}\n{data}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_known_vector() {
        // RFC 4231, test case 2
        let creds = ApiCredentials::new("id".into(), "Jefe".into());
        let signer = RequestSigner::new(&creds);

        let signature = signer.sign("what do ya want for nothing?").unwrap();

        assert_eq!(
            signature,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_client_signature_message_layout() {
        let creds = ApiCredentials::new("id".into(), "secret".into());
        let signer = RequestSigner::new(&creds);

        assert_eq!(
            signer.sign_client_signature(1000, "abc", "").unwrap(),
            signer.sign("1000\nabc\n").unwrap()
        );
        assert_ne!(
            signer.sign_client_signature(1000, "abc", "").unwrap(),
            signer.sign_client_signature(1001, "abc", "").unwrap()
        );
    }

    #[test]
    fn test_sign_empty_message() {
        let creds = ApiCredentials::new("id".into(), "secret".into());
        let signature = RequestSigner::new(&creds).sign("").unwrap();
        assert_eq!(signature.len(), 64);
    }
}
