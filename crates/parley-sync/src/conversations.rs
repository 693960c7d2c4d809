//! Live, deduplicated view of the user's threads: one bulk fetch, then a
//! streaming subscription merged into a published snapshot.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use parley_shared::{SyncError, ThreadId};
use parley_transport::{stream, MessagingClient, StreamHandle, ThreadHandle};

use crate::config::SyncConfig;

/// Read-only view of the current thread list. Updated by replacement, never
/// mutated in place; consumers hold it as long as they like.
pub type ThreadSnapshot = Arc<Vec<Arc<dyn ThreadHandle>>>;

/// Maintains the live thread list for one client.
pub struct ConversationSyncEngine {
    client: Arc<dyn MessagingClient>,
    config: SyncConfig,
}

/// The running engine as seen by a consumer: snapshot watch, error side
/// channel, stop handle. Dropping the feed stops the engine.
pub struct ConversationFeed {
    snapshot_rx: watch::Receiver<ThreadSnapshot>,
    errors: mpsc::Receiver<SyncError>,
    handle: StreamHandle,
}

impl ConversationFeed {
    /// The current snapshot.
    pub fn snapshot(&self) -> ThreadSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Wait for the next snapshot update. Returns `false` once the engine
    /// has stopped publishing.
    pub async fn changed(&mut self) -> bool {
        self.snapshot_rx.changed().await.is_ok()
    }

    /// Next sync failure, if one has been reported.
    pub fn try_next_error(&mut self) -> Option<SyncError> {
        self.errors.try_recv().ok()
    }

    /// Await the next sync failure.
    pub async fn next_error(&mut self) -> Option<SyncError> {
        self.errors.recv().await
    }

    /// Stop the engine. Idempotent; also safe when the stream never opened.
    pub fn stop(&self) {
        self.handle.stop();
    }
}

impl ConversationSyncEngine {
    pub fn new(client: Arc<dyn MessagingClient>, config: SyncConfig) -> Self {
        Self { client, config }
    }

    /// Bulk-list active threads, publish the snapshot, then keep merging
    /// streamed threads by ID.
    ///
    /// A failed bulk list degrades to an empty snapshot; a failed or erroring
    /// stream leaves the last published snapshot serving. Both are reported
    /// on the error channel, never thrown at the caller.
    pub async fn start(&self) -> ConversationFeed {
        let (err_tx, err_rx) = mpsc::channel(self.config.channel_capacity);

        let mut entries: Vec<Arc<dyn ThreadHandle>> = Vec::new();
        let mut seen: HashSet<ThreadId> = HashSet::new();
        match self.client.list_threads(true).await {
            Ok(initial) => {
                for thread in initial {
                    if seen.insert(thread.info().id) {
                        entries.push(thread);
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Initial thread list failed, starting empty");
                let _ = err_tx.try_send(SyncError::InitialFetchFailed(e.to_string()));
            }
        }

        // Publish before opening the stream: the merge-by-ID below absorbs
        // anything delivered on both paths.
        let (snapshot_tx, snapshot_rx) = watch::channel::<ThreadSnapshot>(Arc::new(entries.clone()));

        let subscription = match self.client.stream_threads().await {
            Ok(sub) => Some(sub),
            Err(e) => {
                warn!(error = %e, "Thread stream failed to open");
                let _ = err_tx.try_send(SyncError::Stream(e.to_string()));
                None
            }
        };

        let (handle, mut stop_rx) = stream::stop_channel();

        if let Some(mut sub) = subscription {
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = stream::stopped(&mut stop_rx) => break,
                        item = sub.next() => match item {
                            None => break,
                            Some(Err(e)) => {
                                warn!(error = %e, "Thread stream error, snapshot kept");
                                let _ = err_tx.try_send(SyncError::Stream(e.to_string()));
                            }
                            Some(Ok(thread)) => {
                                let id = thread.info().id;
                                if seen.insert(id) {
                                    entries.push(thread);
                                    let _ = snapshot_tx.send(Arc::new(entries.clone()));
                                }
                            }
                        },
                    }
                }
                sub.stop();
                debug!("Conversation sync loop ended");
            });
        }

        ConversationFeed {
            snapshot_rx,
            errors: err_rx,
            handle,
        }
    }
}
