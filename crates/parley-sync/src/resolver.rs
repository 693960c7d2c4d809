//! Idempotent thread resolution: at most one direct-message thread per
//! (client, peer inbox) pair, despite eventually-consistent remote state.

use std::sync::Arc;

use tracing::{debug, info};

use parley_shared::{Address, ThreadResolutionError};
use parley_transport::{MessagingClient, ThreadHandle};

/// Resolve the canonical thread for a peer wallet address, creating one only
/// after two sync/lookup rounds have come up empty.
///
/// The steps are strictly ordered: inbox lookup, mandatory resync, lookup,
/// second resync, retry lookup, create. The second round absorbs the race
/// where the peer creates the thread concurrently with the first sync;
/// creating any earlier could produce a duplicate thread for the pair.
pub async fn get_or_create_thread(
    client: &dyn MessagingClient,
    peer_address: &Address,
) -> Result<Arc<dyn ThreadHandle>, ThreadResolutionError> {
    let peer_inbox = client
        .find_inbox_by_address(peer_address)
        .await?
        .ok_or_else(|| ThreadResolutionError::PeerNotRegistered(peer_address.clone()))?;
    debug!(peer = %peer_address.short(), inbox = %peer_inbox, "Resolving thread");

    // The local thread list may be stale; looking up before a sync can miss
    // a thread the peer already created.
    client.sync_threads().await?;
    if let Some(thread) = client.thread_by_peer_inbox(&peer_inbox).await? {
        debug!(thread = %thread.info().id, "Existing thread found");
        return Ok(thread);
    }

    client.sync_threads().await?;
    if let Some(thread) = client.thread_by_peer_inbox(&peer_inbox).await? {
        debug!(thread = %thread.info().id, "Thread appeared on second sync");
        return Ok(thread);
    }

    let thread = client
        .create_thread(&peer_inbox)
        .await
        .map_err(|e| ThreadResolutionError::CreateFailed(e.to_string()))?;
    info!(
        thread = %thread.info().id,
        peer = %peer_address.short(),
        "Created new thread"
    );
    Ok(thread)
}
