//! One-line conversation previews for list rows.

use chrono::NaiveDate;

use parley_shared::constants::EMPTY_SNIPPET;
use parley_shared::{codec, InboxId, Message, MessageKind, MessagePayload, SyncError};
use parley_transport::ThreadHandle;

/// Whether the previewed message was sent by the viewing inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

/// A conversation-row preview derived from the newest application message.
#[derive(Debug, Clone, PartialEq)]
pub struct Snippet {
    pub text: String,
    /// Timestamp of the previewed message, nanoseconds since the Unix epoch.
    pub sent_at_ns: Option<i64>,
    pub direction: Option<Direction>,
}

impl Snippet {
    fn empty() -> Self {
        Self {
            text: EMPTY_SNIPPET.to_string(),
            sent_at_ns: None,
            direction: None,
        }
    }
}

/// Project the thread's newest application message into a preview line.
///
/// Structured payloads map to fixed phrases; plain text is shown verbatim.
/// Threads with no application messages yield the placeholder snippet.
pub async fn project(
    thread: &dyn ThreadHandle,
    self_inbox: &InboxId,
) -> Result<Snippet, SyncError> {
    let history = thread
        .messages()
        .await
        .map_err(|e| SyncError::InitialFetchFailed(e.to_string()))?;

    let newest = history
        .iter()
        .rev()
        .find(|m| m.kind == MessageKind::Application);
    Ok(match newest {
        Some(message) => preview(message, self_inbox),
        None => Snippet::empty(),
    })
}

fn preview(message: &Message, self_inbox: &InboxId) -> Snippet {
    let direction = if &message.sender_inbox_id == self_inbox {
        Direction::Sent
    } else {
        Direction::Received
    };
    let text = match (codec::decode(&message.body), direction) {
        (MessagePayload::Text { content, .. }, _) => content,
        (MessagePayload::Offer(_), Direction::Sent) => "Sent an offer".to_string(),
        (MessagePayload::Offer(_), Direction::Received) => "Received an offer".to_string(),
        (MessagePayload::OfferAccepted(_), Direction::Sent) => "Accepted an offer".to_string(),
        (MessagePayload::OfferAccepted(_), Direction::Received) => {
            "Accepted your offer".to_string()
        }
        (MessagePayload::DomainShare(_), Direction::Sent) => "Sent a domain listing".to_string(),
        (MessagePayload::DomainShare(_), Direction::Received) => {
            "Received a domain listing".to_string()
        }
        // The accepting side has no distinct phrasing upstream; both
        // directions read as the sharer's notification.
        (MessagePayload::DomainShareAccepted(_), _) => {
            "Accepted your domain listing".to_string()
        }
    };
    Snippet {
        text,
        sent_at_ns: Some(message.sent_at_ns),
        direction: Some(direction),
    }
}

/// The calendar day (UTC) a message was sent, for date-separator grouping.
pub fn calendar_day(sent_at_ns: i64) -> NaiveDate {
    chrono::DateTime::from_timestamp_nanos(sent_at_ns).date_naive()
}
