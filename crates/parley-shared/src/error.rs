use thiserror::Error;

use crate::types::Address;

/// Errors from the wallet-supplied signing capability.
#[derive(Error, Debug)]
pub enum SignerError {
    /// No signer is attached to the current wallet session.
    #[error("No signer available for the connected wallet")]
    Unavailable,

    /// The user declined the signature prompt.
    #[error("Signature request rejected by the user")]
    Rejected,

    #[error("Signer error: {0}")]
    Other(String),
}

/// Low-level transport failures, bridged into the operation-specific
/// taxonomies below at each call site.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The messaging network could not be reached.
    #[error("Transport unreachable: {0}")]
    Unreachable(String),

    /// An operation was attempted on a client after `close()`.
    #[error("Messaging client is closed")]
    ClientClosed,

    /// The message body exceeds the transport limit.
    #[error("Message body of {size} bytes exceeds the {max} byte limit")]
    BodyTooLarge { size: usize, max: usize },

    #[error("Transport error: {0}")]
    Other(String),
}

/// Failures while establishing or attaching to a messaging identity.
/// Fatal to the current connect attempt; surfaced as a retry prompt.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// No signing capability was supplied by the wallet layer.
    #[error("No signer available to register a messaging identity")]
    SignerUnavailable,

    /// The user declined the identity registration signature.
    #[error("Messaging identity signature rejected by the user")]
    UserRejectedSignature,

    /// Attempted to attach to an identity that was never registered.
    #[error("Address {0} has no messaging identity")]
    NotProvisioned(Address),

    #[error("Transport unreachable: {0}")]
    TransportUnreachable(String),
}

impl From<SignerError> for IdentityError {
    fn from(err: SignerError) -> Self {
        match err {
            SignerError::Unavailable => IdentityError::SignerUnavailable,
            SignerError::Rejected => IdentityError::UserRejectedSignature,
            SignerError::Other(msg) => IdentityError::TransportUnreachable(msg),
        }
    }
}

impl From<TransportError> for IdentityError {
    fn from(err: TransportError) -> Self {
        IdentityError::TransportUnreachable(err.to_string())
    }
}

/// Failures of the get-or-create thread protocol.
#[derive(Error, Debug)]
pub enum ThreadResolutionError {
    /// The peer has never registered with the messaging network.
    /// Expected and recoverable; the UI explains that the peer hasn't joined.
    #[error("Peer {0} is not registered on the messaging network")]
    PeerNotRegistered(Address),

    /// Lookup or resync failed; retryable by re-invoking the resolver.
    #[error("Thread resolution transport error: {0}")]
    Transport(#[from] TransportError),

    /// Thread creation failed after both lookups were exhausted.
    #[error("Thread creation failed: {0}")]
    CreateFailed(String),
}

/// Non-fatal sync failures. Engines keep their last-known-good snapshot and
/// report these on a side channel.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The initial bulk fetch failed; the snapshot starts empty.
    #[error("Initial fetch failed: {0}")]
    InitialFetchFailed(String),

    /// A manual resync failed; held messages are unaffected.
    #[error("Resync failed: {0}")]
    ResyncFailed(String),

    /// The streaming subscription reported an error mid-stream.
    #[error("Stream error: {0}")]
    Stream(String),
}

/// A single send failed. Never retried by the engine; duplicate-send risk
/// stays under caller control.
#[derive(Error, Debug)]
pub enum SendError {
    /// The payload could not be encoded to a wire body.
    #[error("Payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Message send failed: {0}")]
    Transport(#[from] TransportError),
}
