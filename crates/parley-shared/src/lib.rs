// Shared domain types, message codec and error taxonomy for the Parley
// messaging layer.

pub mod codec;
pub mod constants;
pub mod error;
pub mod types;

pub use codec::{decode, encode, ListingShare, MessagePayload, OfferTerms};
pub use error::{
    IdentityError, SendError, SignerError, SyncError, ThreadResolutionError, TransportError,
};
pub use types::{
    Address, DomainContext, InboxId, Message, MessageId, MessageKind, ThreadId, ThreadInfo,
};
