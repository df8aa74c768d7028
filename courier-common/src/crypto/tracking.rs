//! Deterministic tracking tokens
//!
//! A token is the hex HMAC-SHA256, keyed by the server secret, of
//! `campaign_id:contact_id:email:server_secret`. Nothing is stored per send: the inbound
//! open/click endpoints recompute the token from the query parameters to
//! authenticate a hit.

use super::{hmac_sha256, hmac_sha256_verify};

#[derive(Clone)]
pub struct TrackingTokens {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TrackingTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingTokens").finish_non_exhaustive()
    }
}

impl TrackingTokens {
    #[must_use]
    pub fn new(server_secret: &str) -> Self {
        Self {
            secret: server_secret.as_bytes().to_vec(),
        }
    }

    fn message(&self, campaign_id: &str, contact_id: &str, email: &str) -> Vec<u8> {
        let mut message = format!("{campaign_id}:{contact_id}:{email}:").into_bytes();
        message.extend_from_slice(&self.secret);
        message
    }

    #[must_use]
    pub fn token(&self, campaign_id: &str, contact_id: &str, email: &str) -> String {
        hex::encode(hmac_sha256(
            &self.secret,
            &self.message(campaign_id, contact_id, email),
        ))
    }

    /// Check a token from an inbound hit in constant time.
    #[must_use]
    pub fn verify(&self, campaign_id: &str, contact_id: &str, email: &str, token: &str) -> bool {
        let Ok(tag) = hex::decode(token) else {
            return false;
        };
        hmac_sha256_verify(
            &self.secret,
            &self.message(campaign_id, contact_id, email),
            &tag,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_deterministic() {
        let tokens = TrackingTokens::new("secret");
        let a = tokens.token("camp-1", "contact-1", "a@example.com");
        let b = tokens.token("camp-1", "contact-1", "a@example.com");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_token_matches_inbound_format() {
        // HMAC-SHA256("secret", "camp-1:contact-1:a@example.com:secret")
        let tokens = TrackingTokens::new("secret");
        assert_eq!(
            tokens.token("camp-1", "contact-1", "a@example.com"),
            "24222ddd9a7f70f81960c8b8f7bbbbc2209a2e3070858271594edcf48d67e765"
        );
    }

    #[test]
    fn test_token_depends_on_every_input() {
        let tokens = TrackingTokens::new("secret");
        let base = tokens.token("camp-1", "contact-1", "a@example.com");
        assert_ne!(base, tokens.token("camp-2", "contact-1", "a@example.com"));
        assert_ne!(base, tokens.token("camp-1", "contact-2", "a@example.com"));
        assert_ne!(base, tokens.token("camp-1", "contact-1", "b@example.com"));
        assert_ne!(
            base,
            TrackingTokens::new("other").token("camp-1", "contact-1", "a@example.com")
        );
    }

    #[test]
    fn test_verify() {
        let tokens = TrackingTokens::new("secret");
        let token = tokens.token("camp-1", "contact-1", "a@example.com");
        assert!(tokens.verify("camp-1", "contact-1", "a@example.com", &token));
        assert!(!tokens.verify("camp-1", "contact-1", "x@example.com", &token));
        assert!(!tokens.verify("camp-1", "contact-1", "a@example.com", "not-hex"));
    }
}
