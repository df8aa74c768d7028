//! Provider-neutral message and result types

use serde::{Deserialize, Serialize};

use crate::text::html_to_text;

/// A single rendered message ready for a provider
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutboundEmail {
    pub from: String,
    pub from_name: Option<String>,
    pub to: String,
    pub subject: String,
    pub html: String,
    /// Plain-text alternative, derived from `html` when absent
    pub text: Option<String>,
    pub reply_to: Option<String>,
    /// Extra headers, added verbatim
    pub headers: Vec<(String, String)>,
    /// Key/value metadata passed to the provider for event correlation
    pub tags: Vec<(String, String)>,
}

impl OutboundEmail {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        html: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            subject: subject.into(),
            html: html.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_from_name(mut self, name: Option<String>) -> Self {
        self.from_name = name;
        self
    }

    #[must_use]
    pub fn with_reply_to(mut self, reply_to: Option<String>) -> Self {
        self.reply_to = reply_to;
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: Option<String>) -> Self {
        self.text = text;
        self
    }

    #[must_use]
    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// The plain-text body, deriving it from the HTML when none was supplied.
    #[must_use]
    pub fn text_body(&self) -> String {
        self.text
            .clone()
            .unwrap_or_else(|| html_to_text(&self.html))
    }
}

/// A message carrying one-click unsubscribe headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEmail {
    pub email: OutboundEmail,
    /// Value of the `List-Unsubscribe` header, e.g. `<https://…>`
    pub list_unsubscribe: Option<String>,
    /// Value of the `List-Unsubscribe-Post` header
    pub list_unsubscribe_post: Option<String>,
}

impl RawEmail {
    pub const ONE_CLICK: &'static str = "List-Unsubscribe=One-Click";

    /// Wrap `email` with a one-click unsubscribe pointing at `url`.
    #[must_use]
    pub fn with_unsubscribe(email: OutboundEmail, url: &str) -> Self {
        Self {
            email,
            list_unsubscribe: Some(format!("<{url}>")),
            list_unsubscribe_post: Some(Self::ONE_CLICK.to_string()),
        }
    }

    /// The compliance headers in send order.
    #[must_use]
    pub fn compliance_headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::with_capacity(2);
        if let Some(value) = &self.list_unsubscribe {
            headers.push(("List-Unsubscribe".to_string(), value.clone()));
        }
        if let Some(value) = &self.list_unsubscribe_post {
            headers.push(("List-Unsubscribe-Post".to_string(), value.clone()));
        }
        headers
    }
}

/// Options shared by every message of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOptions {
    pub headers: Vec<(String, String)>,
    pub tags: Vec<(String, String)>,
}

impl BatchOptions {
    /// Merge the shared options into one message of the batch.
    #[must_use]
    pub fn apply(&self, email: &OutboundEmail) -> OutboundEmail {
        let mut email = email.clone();
        email.headers.extend(self.headers.iter().cloned());
        email.tags.extend(self.tags.iter().cloned());
        email
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: String,
}

/// Outcome for one message of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub message_id: Option<String>,
    pub email: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Sending limits reported by (or assumed for) a provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quota {
    /// Messages per second
    pub max_send_rate: f64,
    /// Messages per rolling window, `None` when unlimited
    #[serde(default)]
    pub max_24_hour_send: Option<u64>,
    #[serde(default)]
    pub sent_last_24_hours: u64,
    /// The window is a billing month rather than 24 hours
    #[serde(default)]
    pub is_monthly_quota: bool,
}

impl Quota {
    /// Sends left in the current window, `None` when unlimited.
    #[must_use]
    pub fn remaining(&self) -> Option<u64> {
        self.max_24_hour_send
            .map(|max| max.saturating_sub(self.sent_last_24_hours))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialCheck {
    pub valid: bool,
    pub error: Option<String>,
}

impl CredentialCheck {
    #[must_use]
    pub const fn valid() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }
}
