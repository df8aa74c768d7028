//! Credential protection and token utilities
//!
//! - [`credentials`]: `iv:ciphertext` encryption of stored provider secrets
//! - [`tracking`]: deterministic HMAC tokens for open/click URLs
//! - [`unsubscribe`]: signed, expiring unsubscribe tokens

pub mod credentials;
pub mod tracking;
pub mod unsubscribe;

use std::fmt;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

pub use credentials::CredentialCipher;
pub use tracking::TrackingTokens;
pub use unsubscribe::{UnsubscribeClaims, UnsubscribeSigner};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),
}

/// Server-side secrets used for credential encryption and token signing
///
/// Values from `COURIER_SERVER_SECRET` and `COURIER_ENCRYPTION_KEY` take
/// precedence over the configuration file.
#[derive(Clone, Default, Deserialize)]
pub struct SecretsConfig {
    /// Signs tracking and unsubscribe tokens
    #[serde(default)]
    pub server_secret: String,

    /// Derives the credential encryption key
    #[serde(default)]
    pub encryption_key: String,
}

impl fmt::Debug for SecretsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretsConfig")
            .field("server_secret", &"<redacted>")
            .field("encryption_key", &"<redacted>")
            .finish()
    }
}

impl SecretsConfig {
    /// Apply environment overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(secret) = std::env::var("COURIER_SERVER_SECRET") {
            self.server_secret = secret;
        }
        if let Ok(key) = std::env::var("COURIER_ENCRYPTION_KEY") {
            self.encryption_key = key;
        }
        self
    }
}

/// HMAC-SHA256 of `message` under `key`.
pub(crate) fn hmac_sha256(key: &[u8], message: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Constant-time check of `tag` against HMAC-SHA256 of `message` under `key`.
pub(crate) fn hmac_sha256_verify(key: &[u8], message: &[u8], tag: &[u8]) -> bool {
    let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(key) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(tag).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_are_redacted() {
        let secrets = SecretsConfig {
            server_secret: "hunter2".to_string(),
            encryption_key: "correct horse".to_string(),
        };

        let debug = format!("{secrets:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("correct horse"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_hmac_verify_rejects_other_keys() {
        let tag = hmac_sha256(b"key", b"message");
        assert!(hmac_sha256_verify(b"key", b"message", &tag));
        assert!(!hmac_sha256_verify(b"other", b"message", &tag));
    }
}
