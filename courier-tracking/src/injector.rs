//! Per-recipient rewriting of message bodies
//!
//! The body is parsed and rewritten with `lol_html`: anchors are pointed at
//! the click endpoint, an open pixel is added when opens are tracked and the
//! unsubscribe footer is always appended. Additions go just before
//! `</body>`, or at the end of the document when the body is never closed.

use std::{cell::Cell, rc::Rc};

use chrono::{DateTime, Duration, Utc};
use courier_common::{
    BrandId, CampaignId, ContactId,
    crypto::{TrackingTokens, UnsubscribeSigner},
    models::TrackingSettings,
};
use lol_html::{
    HandlerResult, RewriteStrSettings, element,
    html_content::{ContentType, EndTag},
    rewrite_str,
};

use crate::{
    TrackingError,
    config::{TrackingConfig, normalise_origin},
};

/// Who a message is for and what it belongs to
#[derive(Debug, Clone, Copy)]
pub struct InjectionContext<'a> {
    /// Campaign or sequence identifier carried as `cid`
    pub source_id: &'a str,
    /// Set for campaign sends, carried in the unsubscribe token
    pub campaign_id: Option<&'a CampaignId>,
    pub contact_id: &'a ContactId,
    pub brand_id: &'a BrandId,
    pub email: &'a str,
    pub settings: TrackingSettings,
    /// Brand override of the configured tracking domain
    pub tracking_domain: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedMessage {
    pub html: String,
    pub unsubscribe_url: String,
}

#[derive(Debug, Clone)]
pub struct TrackingInjector {
    tokens: TrackingTokens,
    unsubscribe: UnsubscribeSigner,
    tracking_domain: String,
    base_url: String,
}

fn should_track(href: &str) -> bool {
    let href = href.trim();
    !(href.is_empty()
        || href.starts_with('#')
        || href
            .get(..7)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("mailto:")))
}

/// The link a recipient clicked, with character references decoded.
fn link_target(href: &str) -> String {
    html_escape::decode_html_entities(href.trim()).into_owned()
}

fn footer(unsubscribe_url: &str) -> String {
    format!(
        r#"<div style="margin-top:24px;font-size:12px;color:#888888;text-align:center;"><p>You are receiving this email because you subscribed to our mailing list.<br><a href="{unsubscribe_url}" style="color:#888888;">Unsubscribe</a></p></div>"#
    )
}

fn pixel(open_url: &str) -> String {
    format!(
        r#"<img src="{open_url}" width="1" height="1" alt="" style="display:block;border:0;" />"#
    )
}

impl TrackingInjector {
    #[must_use]
    pub fn new(config: &TrackingConfig, server_secret: &str) -> Self {
        Self {
            tokens: TrackingTokens::new(server_secret),
            unsubscribe: UnsubscribeSigner::new(
                server_secret,
                Duration::days(i64::from(config.unsubscribe_ttl_days)),
            ),
            tracking_domain: normalise_origin(&config.tracking_domain),
            base_url: normalise_origin(&config.base_url),
        }
    }

    #[must_use]
    pub const fn tokens(&self) -> &TrackingTokens {
        &self.tokens
    }

    #[must_use]
    pub const fn unsubscribe_signer(&self) -> &UnsubscribeSigner {
        &self.unsubscribe
    }

    /// Signed, expiring unsubscribe link for the recipient.
    #[must_use]
    pub fn unsubscribe_url(&self, context: &InjectionContext<'_>, now: DateTime<Utc>) -> String {
        let token =
            self.unsubscribe
                .sign(context.contact_id, context.brand_id, context.campaign_id, now);
        format!("{}/unsubscribe/{token}", self.base_url)
    }

    /// Query string shared by the open and click endpoints.
    fn tracking_query(&self, context: &InjectionContext<'_>) -> String {
        let token = self.tokens.token(
            context.source_id,
            context.contact_id.as_str(),
            context.email,
        );
        format!(
            "cid={}&lid={}&e={}&t={token}",
            urlencoding::encode(context.source_id),
            urlencoding::encode(context.contact_id.as_str()),
            urlencoding::encode(context.email),
        )
    }

    pub fn inject(
        &self,
        html: &str,
        context: &InjectionContext<'_>,
        now: DateTime<Utc>,
    ) -> Result<InjectedMessage, TrackingError> {
        let domain = context
            .tracking_domain
            .filter(|domain| !domain.trim().is_empty())
            .map_or_else(|| self.tracking_domain.clone(), normalise_origin);
        let query = self.tracking_query(context);
        let unsubscribe_url = self.unsubscribe_url(context, now);

        let mut trailer = footer(&unsubscribe_url);
        if context.settings.track_opens {
            trailer.push_str(&pixel(&format!("{domain}/tracking/open?{query}")));
        }

        let click_base = format!("{domain}/tracking/click?{query}&url=");
        let placed = Rc::new(Cell::new(false));

        let mut handlers = vec![element!("body", |el| {
            if let Some(end_handlers) = el.end_tag_handlers() {
                let trailer = trailer.clone();
                let placed = Rc::clone(&placed);
                end_handlers.push(Box::new(move |end: &mut EndTag<'_>| -> HandlerResult {
                    end.before(&trailer, ContentType::Html);
                    placed.set(true);
                    Ok(())
                }) as Box<dyn FnOnce(&mut EndTag<'_>) -> HandlerResult>);
            }
            Ok(())
        })];

        if context.settings.track_clicks {
            handlers.push(element!("a[href]", |el| {
                if let Some(href) = el.get_attribute("href")
                    && should_track(&href)
                {
                    el.set_attribute(
                        "href",
                        &format!("{click_base}{}", urlencoding::encode(&link_target(&href))),
                    )?;
                }
                Ok(())
            }));
        }

        let mut html = rewrite_str(
            html,
            RewriteStrSettings {
                element_content_handlers: handlers,
                ..RewriteStrSettings::new()
            },
        )
        .map_err(|e| TrackingError::Rewrite(e.to_string()))?;

        if !placed.get() {
            html.push_str(&trailer);
        }

        Ok(InjectedMessage {
            html,
            unsubscribe_url,
        })
    }
}
