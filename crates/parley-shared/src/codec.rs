//! Classification codec for structured payloads carried inside opaque
//! message bodies.
//!
//! Plain text without a domain context travels as the raw string so that
//! plain-text-only peers stay interoperable. Everything else is a JSON
//! envelope with a `type` discriminator. Unrecognized discriminators and
//! unparseable bodies degrade to plain text rather than erroring, so newer
//! payload kinds never break older clients.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::DomainContext;

// ---------------------------------------------------------------------------
// Payload types
// ---------------------------------------------------------------------------

/// Commercial terms of an offer on a tokenized domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OfferTerms {
    pub price: f64,
    /// Currency symbol, e.g. `ETH` or `USDC`.
    pub currency: String,
    /// Offer expiry, epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
    #[serde(rename = "domainData")]
    pub domain: DomainContext,
}

/// A listing shared into the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingShare {
    #[serde(rename = "domainData")]
    pub domain: DomainContext,
}

/// The classified content of a message body.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    /// Free-form text, optionally annotated with the listing being discussed.
    Text {
        content: String,
        domain: Option<DomainContext>,
    },
    Offer(OfferTerms),
    OfferAccepted(OfferTerms),
    DomainShare(ListingShare),
    DomainShareAccepted(ListingShare),
}

impl MessagePayload {
    pub fn text(content: impl Into<String>) -> Self {
        MessagePayload::Text {
            content: content.into(),
            domain: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire envelope
// ---------------------------------------------------------------------------

/// The JSON envelope as it appears on the wire. The `timestamp` is written
/// for interoperability with existing consumers and ignored on decode; the
/// authoritative send time lives on the transport message.
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Envelope {
    Text {
        message: String,
        #[serde(rename = "domainData", default, skip_serializing_if = "Option::is_none")]
        domain: Option<DomainContext>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
    Offer {
        #[serde(flatten)]
        terms: OfferTerms,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
    OfferAccepted {
        #[serde(flatten)]
        terms: OfferTerms,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
    DomainShare {
        #[serde(flatten)]
        share: ListingShare,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
    DomainShareAccepted {
        #[serde(flatten)]
        share: ListingShare,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
    /// Forward-compatibility arm: any unrecognized `type` lands here and the
    /// caller falls back to plain text.
    #[serde(other)]
    Unknown,
}

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

/// Serialize a payload to a wire body. Plain `Text` with no domain context
/// is the identity function on the string.
pub fn encode(payload: &MessagePayload) -> Result<String, serde_json::Error> {
    let now_ms = Some(Utc::now().timestamp_millis());
    let envelope = match payload {
        MessagePayload::Text {
            content,
            domain: None,
        } => return Ok(content.clone()),
        MessagePayload::Text {
            content,
            domain: Some(domain),
        } => Envelope::Text {
            message: content.clone(),
            domain: Some(domain.clone()),
            timestamp: now_ms,
        },
        MessagePayload::Offer(terms) => Envelope::Offer {
            terms: terms.clone(),
            timestamp: now_ms,
        },
        MessagePayload::OfferAccepted(terms) => Envelope::OfferAccepted {
            terms: terms.clone(),
            timestamp: now_ms,
        },
        MessagePayload::DomainShare(share) => Envelope::DomainShare {
            share: share.clone(),
            timestamp: now_ms,
        },
        MessagePayload::DomainShareAccepted(share) => Envelope::DomainShareAccepted {
            share: share.clone(),
            timestamp: now_ms,
        },
    };
    serde_json::to_string(&envelope)
}

/// Classify a wire body. Total: anything that is not a well-formed envelope
/// with a recognized `type` comes back as plain text, verbatim.
pub fn decode(raw: &str) -> MessagePayload {
    match serde_json::from_str::<Envelope>(raw) {
        Ok(Envelope::Text {
            message, domain, ..
        }) => MessagePayload::Text {
            content: message,
            domain,
        },
        Ok(Envelope::Offer { terms, .. }) => MessagePayload::Offer(terms),
        Ok(Envelope::OfferAccepted { terms, .. }) => MessagePayload::OfferAccepted(terms),
        Ok(Envelope::DomainShare { share, .. }) => MessagePayload::DomainShare(share),
        Ok(Envelope::DomainShareAccepted { share, .. }) => {
            MessagePayload::DomainShareAccepted(share)
        }
        Ok(Envelope::Unknown) | Err(_) => MessagePayload::text(raw),
    }
}
