//! The narrow async-trait surface this layer requires from a messaging
//! network. Everything above (session, sync engines, snippet projection)
//! is written against these traits, never against a concrete transport.

use std::sync::Arc;

use async_trait::async_trait;

use parley_shared::{
    Address, IdentityError, InboxId, Message, SignerError, ThreadInfo, TransportError,
};

use crate::stream::{MessageStream, ThreadStream};

/// Wallet-supplied signing capability. Interactive: the user may reject,
/// which must surface as `SignerError::Rejected`.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, SignerError>;
}

/// Entry point to the messaging network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the address already carries a messaging identity.
    /// Side-effect-free.
    async fn is_registered(&self, address: &Address) -> Result<bool, TransportError>;

    /// Attach to an existing identity, non-interactively.
    async fn build(&self, address: &Address) -> Result<Arc<dyn MessagingClient>, IdentityError>;

    /// Register a new identity. Requires an interactive signature.
    async fn create(
        &self,
        address: &Address,
        signer: &dyn Signer,
    ) -> Result<Arc<dyn MessagingClient>, IdentityError>;
}

/// A live handle bound to one identity. No operation below is valid after
/// `close()`; the transport answers `TransportError::ClientClosed`.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    fn inbox_id(&self) -> &InboxId;

    fn address(&self) -> &Address;

    /// Address → inbox lookup. `None` means the peer has never registered.
    async fn find_inbox_by_address(
        &self,
        address: &Address,
    ) -> Result<Option<InboxId>, TransportError>;

    /// Bulk-list the client's threads, optionally filtered to active ones.
    async fn list_threads(
        &self,
        active_only: bool,
    ) -> Result<Vec<Arc<dyn ThreadHandle>>, TransportError>;

    /// Force a remote resync of the thread list. The local view may be stale
    /// until this completes.
    async fn sync_threads(&self) -> Result<(), TransportError>;

    /// Look up the thread with the given counterparty in the local view.
    async fn thread_by_peer_inbox(
        &self,
        peer: &InboxId,
    ) -> Result<Option<Arc<dyn ThreadHandle>>, TransportError>;

    /// Create a new direct-message thread with the given counterparty.
    async fn create_thread(&self, peer: &InboxId)
        -> Result<Arc<dyn ThreadHandle>, TransportError>;

    /// Open a streaming subscription for newly created or updated threads.
    async fn stream_threads(&self) -> Result<ThreadStream, TransportError>;

    /// Tear the client down. Idempotent.
    async fn close(&self);
}

/// One direct-message thread, scoped to the viewing client.
#[async_trait]
pub trait ThreadHandle: Send + Sync {
    fn info(&self) -> ThreadInfo;

    /// Bulk message history, oldest first.
    async fn messages(&self) -> Result<Vec<Message>, TransportError>;

    /// Transmit an opaque body. No retries at this level.
    async fn send(&self, body: &str) -> Result<(), TransportError>;

    /// Open a streaming subscription for new messages in this thread.
    async fn stream(&self) -> Result<MessageStream, TransportError>;
}

impl std::fmt::Debug for dyn MessagingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagingClient")
            .field("inbox_id", self.inbox_id())
            .finish()
    }
}

impl std::fmt::Debug for dyn ThreadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadHandle").field("id", &self.info().id).finish()
    }
}
