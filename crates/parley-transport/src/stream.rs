//! Channel-backed streaming subscriptions.
//!
//! A transport implementation pushes items from a background task into a
//! bounded channel; the consumer reads the `Subscription` end. Stopping is a
//! watch-channel signal: `StreamHandle::stop()` is idempotent, and dropping
//! every handle stops the producer too, so a leaked subscription cannot
//! outlive its consumer.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, watch};

use parley_shared::{Message, TransportError};

use crate::client::ThreadHandle;

/// Items carried by a subscription: values interleaved with transport
/// errors that did not terminate the stream.
pub type StreamItem<T> = Result<T, TransportError>;

/// Subscription of newly created/updated threads.
pub type ThreadStream = Subscription<Arc<dyn ThreadHandle>>;

/// Subscription of new messages within one thread.
pub type MessageStream = Subscription<Message>;

/// Stop signal for one subscription. Cloneable; `stop` may be called any
/// number of times from any handle.
#[derive(Clone)]
pub struct StreamHandle {
    stop: Arc<watch::Sender<bool>>,
}

impl StreamHandle {
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }
}

/// The consuming end of a streaming subscription.
pub struct Subscription<T> {
    items: mpsc::Receiver<StreamItem<T>>,
    handle: StreamHandle,
}

impl<T> Subscription<T> {
    /// Receive the next item; `None` once the producer has shut down.
    pub async fn recv(&mut self) -> Option<StreamItem<T>> {
        self.items.recv().await
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle.clone()
    }

    pub fn stop(&self) {
        self.handle.stop();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = StreamItem<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.items.poll_recv(cx)
    }
}

/// Build the pieces of a subscription: the producer keeps the item sender
/// and the stop receiver, the consumer gets the `Subscription`.
pub fn subscription_channel<T>(
    capacity: usize,
) -> (
    mpsc::Sender<StreamItem<T>>,
    watch::Receiver<bool>,
    Subscription<T>,
) {
    let (item_tx, item_rx) = mpsc::channel(capacity);
    let (stop_tx, stop_rx) = watch::channel(false);
    let subscription = Subscription {
        items: item_rx,
        handle: StreamHandle {
            stop: Arc::new(stop_tx),
        },
    };
    (item_tx, stop_rx, subscription)
}

/// A standalone stop signal with no item channel, for tasks that publish
/// through their own means (e.g. a watch-published snapshot). Dropping the
/// handle stops the task, same as a subscription.
pub fn stop_channel() -> (StreamHandle, watch::Receiver<bool>) {
    let (stop_tx, stop_rx) = watch::channel(false);
    (
        StreamHandle {
            stop: Arc::new(stop_tx),
        },
        stop_rx,
    )
}

/// Producer-side helper: resolves once stop is signalled or every handle is
/// gone. Intended for use inside `tokio::select!`.
pub async fn stopped(stop_rx: &mut watch::Receiver<bool>) {
    loop {
        if *stop_rx.borrow() {
            return;
        }
        if stop_rx.changed().await.is_err() {
            // All handles dropped; treat as stop.
            return;
        }
    }
}
