use async_trait::async_trait;

use crate::{
    ProviderError,
    message::{BatchOptions, BatchResult, CredentialCheck, OutboundEmail, Quota, RawEmail, SendReceipt},
};

/// Uniform contract over every transport a brand can send through
#[async_trait]
pub trait EmailProvider: Send + Sync + std::fmt::Debug {
    /// Short provider label used in logs and rate-limit keys.
    fn name(&self) -> &'static str;

    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, ProviderError>;

    /// Send with one-click unsubscribe headers attached.
    async fn send_raw(&self, email: &RawEmail) -> Result<SendReceipt, ProviderError>;

    /// Send each message independently, producing exactly one result per
    /// input in input order. A failing message never aborts the batch.
    async fn send_batch(
        &self,
        emails: &[OutboundEmail],
        options: &BatchOptions,
    ) -> Vec<BatchResult> {
        let mut results = Vec::with_capacity(emails.len());

        for email in emails {
            let result = match self.send(&options.apply(email)).await {
                Ok(receipt) => BatchResult {
                    message_id: Some(receipt.message_id),
                    email: email.to.clone(),
                    success: true,
                    error: None,
                },
                Err(e) => BatchResult {
                    message_id: None,
                    email: email.to.clone(),
                    success: false,
                    error: Some(e.to_string()),
                },
            };
            results.push(result);
        }

        results
    }

    /// Current sending limits, falling back to configured defaults when the
    /// provider cannot be asked.
    async fn get_quota(&self) -> Quota;

    async fn verify_credentials(&self) -> CredentialCheck;
}
