//! Amazon SES v2 API adapter
//!
//! Messages are sent as raw MIME through `SendEmail`, so custom and
//! compliance headers survive unchanged. Quota and credential checks both
//! use `GetAccount`.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::Utc;
use courier_common::outgoing;
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::{
    EmailProvider, ProviderError,
    message::{CredentialCheck, OutboundEmail, Quota, RawEmail, SendReceipt},
    mime,
    sigv4::{self, SignableRequest, SigningParams},
};

const SERVICE: &str = "ses";

pub struct SesProvider {
    client: reqwest::Client,
    endpoint: String,
    region: String,
    access_key_id: String,
    secret_access_key: String,
    fallback_quota: Quota,
}

impl std::fmt::Debug for SesProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SesProvider")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendEmailResponse {
    message_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SendQuota {
    #[serde(default)]
    max_24_hour_send: f64,
    #[serde(default)]
    max_send_rate: f64,
    #[serde(default)]
    sent_last_24_hours: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AccountResponse {
    #[serde(default)]
    send_quota: Option<SendQuota>,
}

/// SES tag values only allow alphanumerics and `_-.@`.
fn tag_value(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '@') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl SesProvider {
    pub fn new(
        client: reqwest::Client,
        endpoint: Option<&str>,
        region: &str,
        access_key_id: String,
        secret_access_key: String,
        fallback_quota: Quota,
    ) -> Self {
        let endpoint = endpoint.map_or_else(
            || format!("https://email.{region}.amazonaws.com"),
            |endpoint| endpoint.trim_end_matches('/').to_string(),
        );

        Self {
            client,
            endpoint,
            region: region.to_string(),
            access_key_id,
            secret_access_key,
            fallback_quota,
        }
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = Url::parse(&format!("{}{path}", self.endpoint))
            .map_err(|e| ProviderError::Configuration(format!("Invalid SES endpoint: {e}")))?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(ProviderError::Configuration(
                    "SES endpoint has no host".to_string(),
                ));
            }
        };

        let payload = body.unwrap_or_default();
        let headers: &[(&str, &str)] = if payload.is_empty() {
            &[]
        } else {
            &[("content-type", "application/json")]
        };

        let signature = sigv4::sign(
            &SigningParams {
                access_key_id: &self.access_key_id,
                secret_access_key: &self.secret_access_key,
                region: &self.region,
                service: SERVICE,
                time: Utc::now(),
            },
            &SignableRequest {
                method: method.as_str(),
                host: &host,
                path: url.path(),
                query: url.query().unwrap_or_default(),
                headers,
                payload: &payload,
            },
        );

        let mut request = self
            .client
            .request(method, url)
            .header("x-amz-date", signature.amz_date)
            .header("x-amz-content-sha256", signature.content_sha256)
            .header("authorization", signature.authorization);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        if !payload.is_empty() {
            request = request.body(payload);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::from_status(status.as_u16(), body))
    }

    async fn send_mime(
        &self,
        email: &OutboundEmail,
        extra_headers: &[(String, String)],
    ) -> Result<SendReceipt, ProviderError> {
        let built = mime::build(email, extra_headers)?;
        let from = mime::sender(email)?;

        let tags: Vec<_> = email
            .tags
            .iter()
            .map(|(name, value)| json!({ "Name": tag_value(name), "Value": tag_value(value) }))
            .collect();

        let mut body = json!({
            "FromEmailAddress": from.to_string(),
            "Destination": { "ToAddresses": [email.to] },
            "Content": { "Raw": { "Data": STANDARD.encode(built.formatted()) } },
        });
        if !tags.is_empty() {
            body["EmailTags"] = json!(tags);
        }

        let payload = serde_json::to_vec(&body)
            .map_err(|e| ProviderError::Message(e.to_string()))?;

        outgoing!(level = DEBUG, provider = SERVICE, "Sending raw message via SES");
        let response: SendEmailResponse = self
            .call(Method::POST, "/v2/email/outbound-emails", Some(payload))
            .await?
            .json()
            .await?;

        Ok(SendReceipt {
            message_id: response.message_id,
        })
    }

    async fn account(&self) -> Result<AccountResponse, ProviderError> {
        Ok(self
            .call(Method::GET, "/v2/email/account", None)
            .await?
            .json()
            .await?)
    }
}

#[async_trait]
impl EmailProvider for SesProvider {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, ProviderError> {
        self.send_mime(email, &[]).await
    }

    async fn send_raw(&self, email: &RawEmail) -> Result<SendReceipt, ProviderError> {
        self.send_mime(&email.email, &email.compliance_headers())
            .await
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "SES reports whole message counts as floats"
    )]
    async fn get_quota(&self) -> Quota {
        match self.account().await {
            Ok(AccountResponse {
                send_quota: Some(quota),
            }) => Quota {
                max_send_rate: quota.max_send_rate,
                max_24_hour_send: (quota.max_24_hour_send >= 0.0)
                    .then_some(quota.max_24_hour_send as u64),
                sent_last_24_hours: quota.sent_last_24_hours.max(0.0) as u64,
                is_monthly_quota: false,
            },
            Ok(_) => self.fallback_quota,
            Err(e) => {
                warn!(provider = SERVICE, error = %e, "Could not read SES quota, using defaults");
                self.fallback_quota
            }
        }
    }

    async fn verify_credentials(&self) -> CredentialCheck {
        match self.account().await {
            Ok(_) => CredentialCheck::valid(),
            Err(e) => CredentialCheck::invalid(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_values_are_sanitised() {
        assert_eq!(tag_value("campaign 42/a"), "campaign_42_a");
        assert_eq!(tag_value("01HX-abc_1.2@x"), "01HX-abc_1.2@x");
    }

    #[test]
    fn test_default_endpoint_uses_region() {
        let provider = SesProvider::new(
            reqwest::Client::new(),
            None,
            "eu-west-2",
            "AKID".to_string(),
            "secret".to_string(),
            Quota {
                max_send_rate: 1.0,
                max_24_hour_send: None,
                sent_last_24_hours: 0,
                is_monthly_quota: false,
            },
        );
        assert_eq!(provider.endpoint, "https://email.eu-west-2.amazonaws.com");
        assert!(!format!("{provider:?}").contains("secret"));
    }
}
