//! SendGrid v3 Web API adapter

use std::collections::BTreeMap;

use async_trait::async_trait;
use courier_common::outgoing;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    EmailProvider, ProviderError,
    message::{CredentialCheck, OutboundEmail, Quota, RawEmail, SendReceipt},
};

const NAME: &str = "sendgrid";

#[derive(Debug, Serialize)]
struct EmailAddress<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<EmailAddress<'a>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    custom_args: BTreeMap<&'a str, &'a str>,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(rename = "type")]
    kind: &'static str,
    value: String,
}

#[derive(Debug, Serialize)]
struct MailSend<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: EmailAddress<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<EmailAddress<'a>>,
    subject: &'a str,
    content: Vec<Content>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    headers: BTreeMap<&'a str, &'a str>,
}

#[derive(Debug, Deserialize)]
struct Credits {
    #[serde(default)]
    total: i64,
    #[serde(default)]
    used: i64,
}

#[derive(Debug, Deserialize)]
struct Scopes {
    #[serde(default)]
    scopes: Vec<String>,
}

pub struct SendgridProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    fallback_quota: Quota,
}

impl std::fmt::Debug for SendgridProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendgridProvider")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl SendgridProvider {
    pub fn new(
        client: reqwest::Client,
        api_base: &str,
        api_key: String,
        fallback_quota: Quota,
    ) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            fallback_quota,
        }
    }

    async fn deliver(
        &self,
        email: &OutboundEmail,
        extra_headers: &[(String, String)],
    ) -> Result<SendReceipt, ProviderError> {
        let headers = email
            .headers
            .iter()
            .chain(extra_headers)
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        let custom_args = email
            .tags
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();

        let body = MailSend {
            personalizations: vec![Personalization {
                to: vec![EmailAddress {
                    email: &email.to,
                    name: None,
                }],
                custom_args,
            }],
            from: EmailAddress {
                email: &email.from,
                name: email.from_name.as_deref(),
            },
            reply_to: email.reply_to.as_deref().map(|reply_to| EmailAddress {
                email: reply_to,
                name: None,
            }),
            subject: &email.subject,
            content: vec![
                Content {
                    kind: "text/plain",
                    value: email.text_body(),
                },
                Content {
                    kind: "text/html",
                    value: email.html.clone(),
                },
            ],
            headers,
        };

        outgoing!(level = DEBUG, provider = NAME, "Sending message via SendGrid API");
        let response = self
            .client
            .post(format!("{}/v3/mail/send", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);

        Ok(SendReceipt {
            message_id: message_id.unwrap_or_else(|| {
                debug!(provider = NAME, "Accepted without X-Message-Id, generating one");
                ulid::Ulid::new().to_string()
            }),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        let response = self
            .client
            .get(format!("{}{path}", self.api_base))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl EmailProvider for SendgridProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, ProviderError> {
        self.deliver(email, &[]).await
    }

    async fn send_raw(&self, email: &RawEmail) -> Result<SendReceipt, ProviderError> {
        self.deliver(&email.email, &email.compliance_headers()).await
    }

    async fn get_quota(&self) -> Quota {
        match self.get::<Credits>("/v3/user/credits").await {
            Ok(credits) if credits.total > 0 => Quota {
                max_24_hour_send: u64::try_from(credits.total).ok(),
                sent_last_24_hours: u64::try_from(credits.used).unwrap_or_default(),
                is_monthly_quota: true,
                ..self.fallback_quota
            },
            Ok(_) => self.fallback_quota,
            Err(e) => {
                warn!(provider = NAME, error = %e, "Could not read SendGrid credits, using defaults");
                self.fallback_quota
            }
        }
    }

    async fn verify_credentials(&self) -> CredentialCheck {
        match self.get::<Scopes>("/v3/scopes").await {
            Ok(scopes) if scopes.scopes.iter().any(|scope| scope == "mail.send") => {
                CredentialCheck::valid()
            }
            Ok(_) => CredentialCheck::invalid("API key lacks the mail.send scope"),
            Err(ProviderError::Authentication(_)) => CredentialCheck::invalid("Invalid API key"),
            Err(e) => CredentialCheck::invalid(e.to_string()),
        }
    }
}
