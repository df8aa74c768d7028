//! RFC 5322 message assembly for raw and relay sends

use lettre::{
    Message,
    message::{
        Mailbox, MultiPart,
        header::{HeaderName, HeaderValue},
    },
};

use crate::{ProviderError, message::OutboundEmail};

/// A built message together with the `Message-ID` it carries
#[derive(Debug)]
pub struct BuiltMessage {
    pub message: Message,
    pub message_id: String,
}

impl BuiltMessage {
    #[must_use]
    pub fn formatted(&self) -> Vec<u8> {
        self.message.formatted()
    }
}

/// The sender mailbox, with display name when one is configured.
pub fn sender(email: &OutboundEmail) -> Result<Mailbox, ProviderError> {
    Ok(Mailbox::new(
        email.from_name.clone().filter(|name| !name.is_empty()),
        email.from.parse()?,
    ))
}

/// Build a `multipart/alternative` message from `email`, appending
/// `extra_headers` after the message's own headers.
pub fn build(
    email: &OutboundEmail,
    extra_headers: &[(String, String)],
) -> Result<BuiltMessage, ProviderError> {
    let from = sender(email)?;
    let to: Mailbox = email.to.parse()?;
    let message_id = format!("<{}@{}>", ulid::Ulid::new(), from.email.domain());

    let mut builder = Message::builder()
        .from(from)
        .to(to)
        .subject(email.subject.clone())
        .message_id(Some(message_id.clone()))
        .date_now();

    if let Some(reply_to) = &email.reply_to {
        builder = builder.reply_to(reply_to.parse()?);
    }

    for (name, value) in email.headers.iter().chain(extra_headers) {
        let name = HeaderName::new_from_ascii(name.clone())
            .map_err(|e| ProviderError::Message(format!("Invalid header name {name}: {e}")))?;
        builder = builder.raw_header(HeaderValue::new(name, value.clone()));
    }

    let message = builder.multipart(MultiPart::alternative_plain_html(
        email.text_body(),
        email.html.clone(),
    ))?;

    Ok(BuiltMessage {
        message,
        message_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> OutboundEmail {
        OutboundEmail::new(
            "news@acme.test",
            "jane@example.com",
            "Spring sale",
            "<p>Half price</p>",
        )
        .with_from_name(Some("Acme".to_string()))
        .with_reply_to(Some("support@acme.test".to_string()))
    }

    #[test]
    fn test_build_includes_headers_and_alternatives() {
        let built = build(
            &email(),
            &[(
                "List-Unsubscribe".to_string(),
                "<https://app.test/unsubscribe/t>".to_string(),
            )],
        )
        .unwrap_or_else(|e| panic!("{e}"));

        let raw = String::from_utf8(built.formatted()).unwrap_or_default();
        assert!(raw.contains("From: Acme <news@acme.test>"));
        assert!(raw.contains("To: jane@example.com"));
        assert!(raw.contains("Reply-To: support@acme.test"));
        assert!(raw.contains("List-Unsubscribe: <https://app.test/unsubscribe/t>"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("text/plain"));
        assert!(raw.contains("Half price"));
        assert!(built.message_id.ends_with("@acme.test>"));
        assert!(raw.contains(&built.message_id));
    }

    #[test]
    fn test_invalid_recipient() {
        let mut email = email();
        email.to = "not an address".to_string();
        assert!(matches!(build(&email, &[]), Err(ProviderError::Message(_))));
    }

    #[test]
    fn test_invalid_header_name() {
        let email = email().with_header("Bad: Header", "x");
        assert!(matches!(build(&email, &[]), Err(ProviderError::Message(_))));
    }
}
