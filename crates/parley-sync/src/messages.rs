//! Per-thread message synchronization: bulk history, streamed tail, manual
//! resync, and sends.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use parley_shared::{codec, Message, MessageId, MessageKind, MessagePayload, SendError, SyncError};
use parley_transport::{stream, MessageStream, StreamHandle, ThreadHandle};

use crate::config::SyncConfig;

/// Read-only ordered message list (oldest first). Replaced, never mutated.
pub type MessageSnapshot = Arc<Vec<Message>>;

enum FeedCommand {
    Resync(oneshot::Sender<()>),
}

/// Maintains the live message list for one thread.
pub struct ThreadSyncEngine {
    thread: Arc<dyn ThreadHandle>,
    config: SyncConfig,
}

/// The running engine: snapshot watch, error side channel, resync command
/// channel, stop handle. Dropping the feed stops the engine.
pub struct MessageFeed {
    snapshot_rx: watch::Receiver<MessageSnapshot>,
    errors: mpsc::Receiver<SyncError>,
    commands: mpsc::Sender<FeedCommand>,
    handle: StreamHandle,
}

impl MessageFeed {
    pub fn snapshot(&self) -> MessageSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Wait for the next snapshot update. Returns `false` once the engine
    /// has stopped publishing.
    pub async fn changed(&mut self) -> bool {
        self.snapshot_rx.changed().await.is_ok()
    }

    pub fn try_next_error(&mut self) -> Option<SyncError> {
        self.errors.try_recv().ok()
    }

    pub async fn next_error(&mut self) -> Option<SyncError> {
        self.errors.recv().await
    }

    /// Force a pull of the thread's history, e.g. after suspected missed
    /// events. Already-held messages are never duplicated. Completion is
    /// awaited; failures are reported on the error channel, distinctly from
    /// send failures. Returns `false` if the engine is no longer running.
    pub async fn resync(&self) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .commands
            .send(FeedCommand::Resync(ack_tx))
            .await
            .is_err()
        {
            return false;
        }
        ack_rx.await.is_ok()
    }

    pub fn stop(&self) {
        self.handle.stop();
    }
}

impl ThreadSyncEngine {
    pub fn new(thread: Arc<dyn ThreadHandle>, config: SyncConfig) -> Self {
        Self { thread, config }
    }

    /// Encode and transmit a payload through the thread. Not retried here:
    /// duplicate-send risk stays under caller control.
    pub async fn send(&self, payload: &MessagePayload) -> Result<(), SendError> {
        let body = codec::encode(payload)?;
        self.thread.send(&body).await?;
        Ok(())
    }

    /// Bulk-fetch the history, publish it, then append streamed messages in
    /// arrival order. Only application messages qualify; transport
    /// bookkeeping entries are dropped. The bulk fetch completes and is
    /// published before the stream opens, so nothing can fall between the
    /// two; anything delivered by both is absorbed by the ID dedupe.
    pub async fn start(&self) -> MessageFeed {
        let (err_tx, err_rx) = mpsc::channel(self.config.channel_capacity);
        let (cmd_tx, mut cmd_rx) = mpsc::channel(self.config.channel_capacity);

        let mut entries: Vec<Message> = Vec::new();
        let mut seen: HashSet<MessageId> = HashSet::new();
        match self.thread.messages().await {
            Ok(history) => {
                for message in history {
                    if qualifies(&message) && seen.insert(message.id.clone()) {
                        entries.push(message);
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Initial message fetch failed, starting empty");
                let _ = err_tx.try_send(SyncError::InitialFetchFailed(e.to_string()));
            }
        }

        let (snapshot_tx, snapshot_rx) = watch::channel::<MessageSnapshot>(Arc::new(entries.clone()));

        let mut subscription: Option<MessageStream> = match self.thread.stream().await {
            Ok(sub) => Some(sub),
            Err(e) => {
                warn!(error = %e, "Message stream failed to open");
                let _ = err_tx.try_send(SyncError::Stream(e.to_string()));
                None
            }
        };

        let (handle, mut stop_rx) = stream::stop_channel();
        let thread = self.thread.clone();

        tokio::spawn(async move {
            let thread_id = thread.info().id;
            loop {
                tokio::select! {
                    _ = stream::stopped(&mut stop_rx) => break,
                    command = cmd_rx.recv() => match command {
                        None => break,
                        Some(FeedCommand::Resync(ack)) => {
                            match thread.messages().await {
                                Ok(history) => {
                                    let mut appended = false;
                                    for message in history {
                                        if qualifies(&message) && seen.insert(message.id.clone()) {
                                            entries.push(message);
                                            appended = true;
                                        }
                                    }
                                    if appended {
                                        let _ = snapshot_tx.send(Arc::new(entries.clone()));
                                    }
                                    debug!(thread = %thread_id, "Resync complete");
                                }
                                Err(e) => {
                                    warn!(thread = %thread_id, error = %e, "Resync failed");
                                    let _ = err_tx.try_send(SyncError::ResyncFailed(e.to_string()));
                                }
                            }
                            let _ = ack.send(());
                        }
                    },
                    item = next_item(&mut subscription) => match item {
                        None => break,
                        Some(Err(e)) => {
                            warn!(thread = %thread_id, error = %e, "Message stream error, snapshot kept");
                            let _ = err_tx.try_send(SyncError::Stream(e.to_string()));
                        }
                        Some(Ok(message)) => {
                            if qualifies(&message) && seen.insert(message.id.clone()) {
                                entries.push(message);
                                let _ = snapshot_tx.send(Arc::new(entries.clone()));
                            }
                        }
                    },
                }
            }
            if let Some(sub) = subscription {
                sub.stop();
            }
            debug!(thread = %thread_id, "Message sync loop ended");
        });

        MessageFeed {
            snapshot_rx,
            errors: err_rx,
            commands: cmd_tx,
            handle,
        }
    }
}

/// Only application messages carry classifiable content.
fn qualifies(message: &Message) -> bool {
    message.kind == MessageKind::Application
}

/// Next stream item, pending forever when the stream never opened (resync
/// and stop remain serviceable).
async fn next_item(
    subscription: &mut Option<MessageStream>,
) -> Option<Result<Message, parley_shared::TransportError>> {
    match subscription {
        Some(sub) => sub.next().await,
        None => std::future::pending().await,
    }
}
