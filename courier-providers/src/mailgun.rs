//! Mailgun HTTP API adapter

use async_trait::async_trait;
use courier_common::outgoing;
use serde::Deserialize;

use crate::{
    EmailProvider, ProviderError,
    message::{CredentialCheck, OutboundEmail, Quota, RawEmail, SendReceipt},
    mime,
};

const NAME: &str = "mailgun";

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    id: String,
}

pub struct MailgunProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    domain: String,
    fallback_quota: Quota,
}

impl std::fmt::Debug for MailgunProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailgunProvider")
            .field("api_base", &self.api_base)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl MailgunProvider {
    pub fn new(
        client: reqwest::Client,
        api_base: &str,
        api_key: String,
        domain: String,
        fallback_quota: Quota,
    ) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            domain,
            fallback_quota,
        }
    }

    /// Form fields for the `messages` endpoint.
    fn form(
        email: &OutboundEmail,
        extra_headers: &[(String, String)],
    ) -> Result<Vec<(String, String)>, ProviderError> {
        let mut form = vec![
            ("from".to_string(), mime::sender(email)?.to_string()),
            ("to".to_string(), email.to.clone()),
            ("subject".to_string(), email.subject.clone()),
            ("html".to_string(), email.html.clone()),
            ("text".to_string(), email.text_body()),
        ];

        if let Some(reply_to) = &email.reply_to {
            form.push(("h:Reply-To".to_string(), reply_to.clone()));
        }
        for (name, value) in email.headers.iter().chain(extra_headers) {
            form.push((format!("h:{name}"), value.clone()));
        }
        for (name, value) in &email.tags {
            form.push((format!("v:{name}"), value.clone()));
        }

        Ok(form)
    }

    async fn deliver(
        &self,
        email: &OutboundEmail,
        extra_headers: &[(String, String)],
    ) -> Result<SendReceipt, ProviderError> {
        let form = Self::form(email, extra_headers)?;

        outgoing!(level = DEBUG, provider = NAME, "Sending message via Mailgun API");
        let response = self
            .client
            .post(format!(
                "{}/v3/{}/messages",
                self.api_base,
                urlencoding::encode(&self.domain)
            ))
            .basic_auth("api", Some(&self.api_key))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let response: MessagesResponse = response.json().await?;
        Ok(SendReceipt {
            message_id: response.id,
        })
    }
}

#[async_trait]
impl EmailProvider for MailgunProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, ProviderError> {
        self.deliver(email, &[]).await
    }

    async fn send_raw(&self, email: &RawEmail) -> Result<SendReceipt, ProviderError> {
        self.deliver(&email.email, &email.compliance_headers()).await
    }

    /// Mailgun does not expose sending limits over the API.
    async fn get_quota(&self) -> Quota {
        self.fallback_quota
    }

    async fn verify_credentials(&self) -> CredentialCheck {
        let response = self
            .client
            .get(format!(
                "{}/v3/domains/{}",
                self.api_base,
                urlencoding::encode(&self.domain)
            ))
            .basic_auth("api", Some(&self.api_key))
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => CredentialCheck::valid(),
            Ok(response) => match response.status().as_u16() {
                401 | 403 => CredentialCheck::invalid("Invalid API key"),
                404 => CredentialCheck::invalid(format!("Domain {} not found", self.domain)),
                status => CredentialCheck::invalid(format!("Unexpected status {status}")),
            },
            Err(e) => CredentialCheck::invalid(ProviderError::from(e).to_string()),
        }
    }
}
