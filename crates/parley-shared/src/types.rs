use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::ADDRESS_SIZE;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// A wallet address (20-byte EVM account). Rendered as lowercase hex with a
/// `0x` prefix; parsing accepts mixed case and an optional prefix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; ADDRESS_SIZE]);

impl Address {
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped.to_ascii_lowercase())?;
        if bytes.len() != ADDRESS_SIZE {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; ADDRESS_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn short(&self) -> String {
        format!("0x{}", &hex::encode(self.0)[..8])
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Opaque inbox identifier assigned by the messaging network. One inbox can
/// map to several wallet addresses; this layer treats the mapping as 1:1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct InboxId(pub String);

impl std::fmt::Display for InboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque thread identifier assigned by the transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ThreadId(pub String);

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque message identifier assigned by the transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Domain context
// ---------------------------------------------------------------------------

/// Listing data attached to offer and share payloads by the marketplace
/// services. Pass-through for this layer; camelCase on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DomainContext {
    /// Tokenized domain name, e.g. `crown.eth`.
    pub name: String,
    /// Chain the token lives on.
    pub network: String,
    /// On-chain token identifier.
    pub token_id: String,
    /// Orderbook listing identifier, when the context comes from a listing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Threads and messages
// ---------------------------------------------------------------------------

/// Metadata of a direct-message thread as reported by the transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreadInfo {
    pub id: ThreadId,
    /// The single counterparty inbox.
    pub peer_inbox_id: InboxId,
    pub created_at: DateTime<Utc>,
    /// Bumped by the transport as messages arrive.
    pub updated_at: DateTime<Utc>,
    /// Consent-derived flag; inactive threads are hidden from listings.
    pub active: bool,
}

/// Distinguishes user content from transport bookkeeping. Membership
/// messages are never classified or previewed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageKind {
    Application,
    Membership,
}

/// A single immutable message within a thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub sender_inbox_id: InboxId,
    /// Send timestamp, nanoseconds since the Unix epoch.
    pub sent_at_ns: i64,
    pub kind: MessageKind,
    /// Opaque body at the transport level; structured per the codec above it.
    pub body: String,
}

impl Message {
    /// Send timestamp as a `chrono` datetime (UTC).
    pub fn sent_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.sent_at_ns)
    }
}
