//! Signed, expiring unsubscribe tokens
//!
//! Format: `base64url(json claims) "." base64url(HMAC-SHA256)`. The MAC is
//! computed over the encoded claims with a key derived from the server
//! secret, so an unsubscribe token can never be confused with a tracking
//! token. Verification fails closed: malformed input, a bad signature or an
//! expired token all yield `None`.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{hmac_sha256, hmac_sha256_verify};
use crate::{BrandId, CampaignId, ContactId};

const KEY_LABEL: &[u8] = b"courier-unsubscribe-v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeClaims {
    pub contact_id: ContactId,
    pub brand_id: BrandId,
    #[serde(default)]
    pub campaign_id: Option<CampaignId>,
    /// Expiry as a unix timestamp in seconds
    pub exp: i64,
}

#[derive(Clone)]
pub struct UnsubscribeSigner {
    key: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for UnsubscribeSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnsubscribeSigner")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl UnsubscribeSigner {
    #[must_use]
    pub fn new(server_secret: &str, ttl: Duration) -> Self {
        Self {
            key: hmac_sha256(server_secret.as_bytes(), KEY_LABEL),
            ttl,
        }
    }

    /// Issue a token for the given recipient, valid for the configured TTL.
    #[must_use]
    pub fn sign(
        &self,
        contact_id: &ContactId,
        brand_id: &BrandId,
        campaign_id: Option<&CampaignId>,
        now: DateTime<Utc>,
    ) -> String {
        let claims = UnsubscribeClaims {
            contact_id: contact_id.clone(),
            brand_id: brand_id.clone(),
            campaign_id: campaign_id.cloned(),
            exp: (now + self.ttl).timestamp(),
        };
        self.sign_claims(&claims)
    }

    #[must_use]
    pub fn sign_claims(&self, claims: &UnsubscribeClaims) -> String {
        // Serializing a struct of strings and integers cannot fail.
        let json = serde_json::to_vec(claims).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = URL_SAFE_NO_PAD.encode(hmac_sha256(&self.key, payload.as_bytes()));
        format!("{payload}.{signature}")
    }

    /// Decode and check a token. Returns `None` for anything not valid right now.
    #[must_use]
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Option<UnsubscribeClaims> {
        let (payload, signature) = token.split_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        if !hmac_sha256_verify(&self.key, payload.as_bytes(), &signature) {
            debug!("Unsubscribe token signature mismatch");
            return None;
        }

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let claims: UnsubscribeClaims = serde_json::from_slice(&json).ok()?;

        if claims.exp <= now.timestamp() {
            debug!(contact_id = %claims.contact_id, "Unsubscribe token expired");
            return None;
        }

        Some(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> UnsubscribeSigner {
        UnsubscribeSigner::new("secret", Duration::days(30))
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = signer();
        let now = Utc::now();
        let token = signer.sign(
            &ContactId::from("contact-1"),
            &BrandId::from("brand-1"),
            Some(&CampaignId::from("camp-1")),
            now,
        );

        let claims = signer.verify(&token, now).unwrap_or_else(|| panic!("valid token"));
        assert_eq!(claims.contact_id.as_str(), "contact-1");
        assert_eq!(claims.brand_id.as_str(), "brand-1");
        assert_eq!(claims.campaign_id, Some(CampaignId::from("camp-1")));
    }

    #[test]
    fn test_expired_token_fails_closed() {
        let signer = signer();
        let issued = Utc::now();
        let token = signer.sign(
            &ContactId::from("contact-1"),
            &BrandId::from("brand-1"),
            None,
            issued,
        );

        assert!(signer.verify(&token, issued + Duration::days(29)).is_some());
        assert!(signer.verify(&token, issued + Duration::days(31)).is_none());
    }

    #[test]
    fn test_tampered_token_fails_closed() {
        let signer = signer();
        let now = Utc::now();
        let token = signer.sign(&ContactId::from("c"), &BrandId::from("b"), None, now);

        let forged = UnsubscribeClaims {
            contact_id: ContactId::from("someone-else"),
            brand_id: BrandId::from("b"),
            campaign_id: None,
            exp: (now + Duration::days(1)).timestamp(),
        };
        let forged_payload =
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap_or_default());
        let (_, signature) = token.split_once('.').unwrap_or_default();

        assert!(signer.verify(&format!("{forged_payload}.{signature}"), now).is_none());
        assert!(signer.verify("garbage", now).is_none());
        assert!(signer.verify("a.b", now).is_none());
    }

    #[test]
    fn test_other_secret_rejects() {
        let now = Utc::now();
        let token = signer().sign(&ContactId::from("c"), &BrandId::from("b"), None, now);
        let other = UnsubscribeSigner::new("different", Duration::days(30));
        assert!(other.verify(&token, now).is_none());
    }
}
