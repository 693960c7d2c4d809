//! In-process transport used by tests and local development.
//!
//! Models the observable behavior of the real network that the layers above
//! depend on: deterministic inbox identifiers, a per-client thread view that
//! goes stale until `sync_threads()` or stream delivery catches it up, and
//! broadcast fan-out for thread and message streams.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_shared::constants::{DEFAULT_CHANNEL_CAPACITY, KDF_CONTEXT_INBOX_ID, MAX_BODY_SIZE};
use parley_shared::{
    Address, IdentityError, InboxId, Message, MessageId, MessageKind, ThreadId, ThreadInfo,
    TransportError,
};

use crate::client::{MessagingClient, Signer, ThreadHandle, Transport};
use crate::stream::{self, subscription_channel, MessageStream, ThreadStream};

// ---------------------------------------------------------------------------
// Shared network state
// ---------------------------------------------------------------------------

struct InboxState {
    /// Threads this inbox has locally synced. Remotely created threads stay
    /// out of this set until `sync_threads()` or stream delivery.
    visible: HashSet<ThreadId>,
    thread_events: broadcast::Sender<ThreadId>,
}

impl InboxState {
    fn new() -> Self {
        let (thread_events, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        Self {
            visible: HashSet::new(),
            thread_events,
        }
    }
}

struct ThreadRecord {
    members: [InboxId; 2],
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    active: bool,
    messages: Vec<Message>,
    message_events: broadcast::Sender<Message>,
}

impl ThreadRecord {
    fn peer_of(&self, viewer: &InboxId) -> InboxId {
        if self.members[0] == *viewer {
            self.members[1].clone()
        } else {
            self.members[0].clone()
        }
    }

    fn has_member(&self, inbox: &InboxId) -> bool {
        self.members[0] == *inbox || self.members[1] == *inbox
    }
}

#[derive(Default)]
struct NetState {
    inboxes: HashMap<Address, InboxId>,
    clients: HashMap<InboxId, InboxState>,
    threads: HashMap<ThreadId, ThreadRecord>,
}

fn now_ns() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// MemoryTransport
// ---------------------------------------------------------------------------

/// The shared in-process network. Clone it to hand the same network to
/// several sessions.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<NetState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, NetState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Deterministic inbox identifier for an address.
    fn derive_inbox_id(address: &Address) -> InboxId {
        let digest = blake3::derive_key(KDF_CONTEXT_INBOX_ID, &address.0);
        InboxId(hex::encode(digest))
    }

    fn register(&self, address: &Address) -> InboxId {
        let mut state = self.lock();
        let inbox = state
            .inboxes
            .entry(address.clone())
            .or_insert_with(|| Self::derive_inbox_id(address))
            .clone();
        state.clients.entry(inbox.clone()).or_insert_with(InboxState::new);
        inbox
    }

    fn client_for(&self, inbox: InboxId, address: Address) -> Arc<dyn MessagingClient> {
        Arc::new(MemoryClient {
            state: self.state.clone(),
            inbox_id: inbox,
            address,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn is_registered(&self, address: &Address) -> Result<bool, TransportError> {
        Ok(self.lock().inboxes.contains_key(address))
    }

    async fn build(&self, address: &Address) -> Result<Arc<dyn MessagingClient>, IdentityError> {
        let inbox = self
            .lock()
            .inboxes
            .get(address)
            .cloned()
            .ok_or_else(|| IdentityError::NotProvisioned(address.clone()))?;
        debug!(address = %address.short(), inbox = %inbox, "Attached to existing inbox");
        Ok(self.client_for(inbox, address.clone()))
    }

    async fn create(
        &self,
        address: &Address,
        signer: &dyn Signer,
    ) -> Result<Arc<dyn MessagingClient>, IdentityError> {
        let challenge = format!("parley: register messaging identity for {address}");
        signer.sign_message(challenge.as_bytes()).await?;

        let inbox = self.register(address);
        info!(address = %address.short(), inbox = %inbox, "Registered messaging identity");
        Ok(self.client_for(inbox, address.clone()))
    }
}

// ---------------------------------------------------------------------------
// MemoryClient
// ---------------------------------------------------------------------------

struct MemoryClient {
    state: Arc<Mutex<NetState>>,
    inbox_id: InboxId,
    address: Address,
    closed: Arc<AtomicBool>,
}

impl MemoryClient {
    fn lock(&self) -> MutexGuard<'_, NetState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ClientClosed);
        }
        Ok(())
    }

    fn handle_for(&self, id: ThreadId) -> Arc<dyn ThreadHandle> {
        Arc::new(MemoryThread {
            state: self.state.clone(),
            id,
            viewer: self.inbox_id.clone(),
            closed: self.closed.clone(),
        })
    }
}

#[async_trait]
impl MessagingClient for MemoryClient {
    fn inbox_id(&self) -> &InboxId {
        &self.inbox_id
    }

    fn address(&self) -> &Address {
        &self.address
    }

    async fn find_inbox_by_address(
        &self,
        address: &Address,
    ) -> Result<Option<InboxId>, TransportError> {
        self.ensure_open()?;
        Ok(self.lock().inboxes.get(address).cloned())
    }

    async fn list_threads(
        &self,
        active_only: bool,
    ) -> Result<Vec<Arc<dyn ThreadHandle>>, TransportError> {
        self.ensure_open()?;
        let mut ids: Vec<(DateTime<Utc>, ThreadId)> = {
            let state = self.lock();
            let visible = match state.clients.get(&self.inbox_id) {
                Some(c) => &c.visible,
                None => return Ok(Vec::new()),
            };
            visible
                .iter()
                .filter_map(|id| {
                    let record = state.threads.get(id)?;
                    if active_only && !record.active {
                        return None;
                    }
                    Some((record.created_at, id.clone()))
                })
                .collect()
        };
        ids.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(ids.into_iter().map(|(_, id)| self.handle_for(id)).collect())
    }

    async fn sync_threads(&self) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut state = self.lock();
        let member_of: Vec<ThreadId> = state
            .threads
            .iter()
            .filter(|(_, record)| record.has_member(&self.inbox_id))
            .map(|(id, _)| id.clone())
            .collect();
        let count = member_of.len();
        if let Some(client) = state.clients.get_mut(&self.inbox_id) {
            client.visible.extend(member_of);
        }
        debug!(inbox = %self.inbox_id, threads = count, "Thread list synced");
        Ok(())
    }

    async fn thread_by_peer_inbox(
        &self,
        peer: &InboxId,
    ) -> Result<Option<Arc<dyn ThreadHandle>>, TransportError> {
        self.ensure_open()?;
        let found = {
            let state = self.lock();
            let visible = match state.clients.get(&self.inbox_id) {
                Some(c) => &c.visible,
                None => return Ok(None),
            };
            visible
                .iter()
                .find(|id| {
                    state
                        .threads
                        .get(id)
                        .is_some_and(|record| record.peer_of(&self.inbox_id) == *peer)
                })
                .cloned()
        };
        Ok(found.map(|id| self.handle_for(id)))
    }

    async fn create_thread(
        &self,
        peer: &InboxId,
    ) -> Result<Arc<dyn ThreadHandle>, TransportError> {
        self.ensure_open()?;
        let id = ThreadId(Uuid::new_v4().to_string());
        let now = Utc::now();
        {
            let mut state = self.lock();
            if !state.clients.contains_key(peer) {
                return Err(TransportError::Other(format!("unknown peer inbox {peer}")));
            }

            let (message_events, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
            let mut record = ThreadRecord {
                members: [self.inbox_id.clone(), peer.clone()],
                created_at: now,
                updated_at: now,
                active: true,
                messages: Vec::new(),
                message_events,
            };
            // Transport bookkeeping entry; filtered out by the sync layer.
            record.messages.push(Message {
                id: MessageId(Uuid::new_v4().to_string()),
                thread_id: id.clone(),
                sender_inbox_id: self.inbox_id.clone(),
                sent_at_ns: now_ns(),
                kind: MessageKind::Membership,
                body: String::new(),
            });
            state.threads.insert(id.clone(), record);

            // The creator sees the thread at once; the peer learns about it
            // from their stream or their next sync.
            if let Some(creator) = state.clients.get_mut(&self.inbox_id) {
                creator.visible.insert(id.clone());
            }
            for inbox in [&self.inbox_id, peer] {
                if let Some(client) = state.clients.get(inbox) {
                    let _ = client.thread_events.send(id.clone());
                }
            }
        }
        info!(thread = %id, peer = %peer, "Thread created");
        Ok(self.handle_for(id))
    }

    async fn stream_threads(&self) -> Result<ThreadStream, TransportError> {
        self.ensure_open()?;
        let mut events = {
            let state = self.lock();
            let client = state
                .clients
                .get(&self.inbox_id)
                .ok_or(TransportError::ClientClosed)?;
            client.thread_events.subscribe()
        };

        let (item_tx, mut stop_rx, subscription) = subscription_channel(DEFAULT_CHANNEL_CAPACITY);
        let state = self.state.clone();
        let viewer = self.inbox_id.clone();
        let closed = self.closed.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stream::stopped(&mut stop_rx) => break,
                    event = events.recv() => match event {
                        Ok(thread_id) => {
                            if closed.load(Ordering::SeqCst) {
                                break;
                            }
                            {
                                let mut guard =
                                    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                                if let Some(client) = guard.clients.get_mut(&viewer) {
                                    client.visible.insert(thread_id.clone());
                                }
                            }
                            let handle: Arc<dyn ThreadHandle> = Arc::new(MemoryThread {
                                state: state.clone(),
                                id: thread_id,
                                viewer: viewer.clone(),
                                closed: closed.clone(),
                            });
                            if item_tx.send(Ok(handle)).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(inbox = %viewer, skipped, "Thread stream lagged");
                            let err = TransportError::Other(format!(
                                "thread stream lagged by {skipped} events"
                            ));
                            if item_tx.send(Err(err)).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!(inbox = %viewer, "Thread stream closed");
        });

        Ok(subscription)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(inbox = %self.inbox_id, "Messaging client closed");
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryThread
// ---------------------------------------------------------------------------

struct MemoryThread {
    state: Arc<Mutex<NetState>>,
    id: ThreadId,
    viewer: InboxId,
    closed: Arc<AtomicBool>,
}

impl MemoryThread {
    fn lock(&self) -> MutexGuard<'_, NetState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ClientClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl ThreadHandle for MemoryThread {
    fn info(&self) -> ThreadInfo {
        let state = self.lock();
        match state.threads.get(&self.id) {
            Some(record) => ThreadInfo {
                id: self.id.clone(),
                peer_inbox_id: record.peer_of(&self.viewer),
                created_at: record.created_at,
                updated_at: record.updated_at,
                active: record.active,
            },
            // The transport never deletes threads; a missing record means the
            // handle outlived the network fixture in a test.
            None => ThreadInfo {
                id: self.id.clone(),
                peer_inbox_id: self.viewer.clone(),
                created_at: DateTime::<Utc>::MIN_UTC,
                updated_at: DateTime::<Utc>::MIN_UTC,
                active: false,
            },
        }
    }

    async fn messages(&self) -> Result<Vec<Message>, TransportError> {
        self.ensure_open()?;
        let state = self.lock();
        let record = state
            .threads
            .get(&self.id)
            .ok_or_else(|| TransportError::Other(format!("unknown thread {}", self.id)))?;
        Ok(record.messages.clone())
    }

    async fn send(&self, body: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        if body.len() > MAX_BODY_SIZE {
            return Err(TransportError::BodyTooLarge {
                size: body.len(),
                max: MAX_BODY_SIZE,
            });
        }

        let message = Message {
            id: MessageId(Uuid::new_v4().to_string()),
            thread_id: self.id.clone(),
            sender_inbox_id: self.viewer.clone(),
            sent_at_ns: now_ns(),
            kind: MessageKind::Application,
            body: body.to_string(),
        };

        let mut state = self.lock();
        let record = state
            .threads
            .get_mut(&self.id)
            .ok_or_else(|| TransportError::Other(format!("unknown thread {}", self.id)))?;
        record.messages.push(message.clone());
        record.updated_at = Utc::now();
        let _ = record.message_events.send(message);
        debug!(thread = %self.id, "Message stored");
        Ok(())
    }

    async fn stream(&self) -> Result<MessageStream, TransportError> {
        self.ensure_open()?;
        let mut events = {
            let state = self.lock();
            let record = state
                .threads
                .get(&self.id)
                .ok_or_else(|| TransportError::Other(format!("unknown thread {}", self.id)))?;
            record.message_events.subscribe()
        };

        let (item_tx, mut stop_rx, subscription) = subscription_channel(DEFAULT_CHANNEL_CAPACITY);
        let closed = self.closed.clone();
        let thread_id = self.id.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stream::stopped(&mut stop_rx) => break,
                    event = events.recv() => match event {
                        Ok(message) => {
                            if closed.load(Ordering::SeqCst) {
                                break;
                            }
                            if item_tx.send(Ok(message)).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(thread = %thread_id, skipped, "Message stream lagged");
                            let err = TransportError::Other(format!(
                                "message stream lagged by {skipped} events"
                            ));
                            if item_tx.send(Err(err)).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!(thread = %thread_id, "Message stream closed");
        });

        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_shared::SignerError;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct ApprovingSigner {
        calls: AtomicUsize,
    }

    impl ApprovingSigner {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Signer for ApprovingSigner {
        async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(message.to_vec())
        }
    }

    struct RejectingSigner;

    #[async_trait]
    impl Signer for RejectingSigner {
        async fn sign_message(&self, _message: &[u8]) -> Result<Vec<u8>, SignerError> {
            Err(SignerError::Rejected)
        }
    }

    fn addr(byte: u8) -> Address {
        Address([byte; 20])
    }

    async fn connect(
        net: &MemoryTransport,
        address: &Address,
    ) -> Arc<dyn MessagingClient> {
        net.create(address, &ApprovingSigner::new()).await.unwrap()
    }

    #[tokio::test]
    async fn registration_flips_is_registered() {
        let net = MemoryTransport::new();
        let alice = addr(1);

        assert!(!net.is_registered(&alice).await.unwrap());
        connect(&net, &alice).await;
        assert!(net.is_registered(&alice).await.unwrap());
    }

    #[tokio::test]
    async fn build_requires_prior_registration() {
        let net = MemoryTransport::new();
        let alice = addr(1);

        match net.build(&alice).await {
            Err(IdentityError::NotProvisioned(a)) => assert_eq!(a, alice),
            other => panic!("expected NotProvisioned, got {other:?}"),
        }

        connect(&net, &alice).await;
        let client = net.build(&alice).await.unwrap();
        assert_eq!(client.address(), &alice);
    }

    #[tokio::test]
    async fn rejected_signature_surfaces_as_user_rejection() {
        let net = MemoryTransport::new();
        match net.create(&addr(1), &RejectingSigner).await {
            Err(IdentityError::UserRejectedSignature) => {}
            other => panic!("expected UserRejectedSignature, got {other:?}"),
        }
        assert!(!net.is_registered(&addr(1)).await.unwrap());
    }

    #[tokio::test]
    async fn inbox_ids_are_deterministic_per_address() {
        let net = MemoryTransport::new();
        let a = connect(&net, &addr(1)).await;
        let b = net.build(&addr(1)).await.unwrap();
        assert_eq!(a.inbox_id(), b.inbox_id());

        let c = connect(&net, &addr(2)).await;
        assert_ne!(a.inbox_id(), c.inbox_id());
    }

    #[tokio::test]
    async fn find_inbox_by_address_distinguishes_unregistered_peers() {
        let net = MemoryTransport::new();
        let alice = connect(&net, &addr(1)).await;
        connect(&net, &addr(2)).await;

        assert!(alice
            .find_inbox_by_address(&addr(2))
            .await
            .unwrap()
            .is_some());
        assert!(alice
            .find_inbox_by_address(&addr(3))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn remotely_created_thread_is_invisible_until_sync() {
        let net = MemoryTransport::new();
        let alice = connect(&net, &addr(1)).await;
        let bob = connect(&net, &addr(2)).await;

        let thread = alice.create_thread(bob.inbox_id()).await.unwrap();

        // Bob's local view is stale.
        assert!(bob
            .thread_by_peer_inbox(alice.inbox_id())
            .await
            .unwrap()
            .is_none());

        bob.sync_threads().await.unwrap();
        let found = bob
            .thread_by_peer_inbox(alice.inbox_id())
            .await
            .unwrap()
            .expect("thread visible after sync");
        assert_eq!(found.info().id, thread.info().id);
    }

    #[tokio::test]
    async fn thread_stream_delivers_and_catches_up_visibility() {
        let net = MemoryTransport::new();
        let alice = connect(&net, &addr(1)).await;
        let bob = connect(&net, &addr(2)).await;

        let mut threads = bob.stream_threads().await.unwrap();
        let created = alice.create_thread(bob.inbox_id()).await.unwrap();

        let streamed = threads.recv().await.unwrap().unwrap();
        assert_eq!(streamed.info().id, created.info().id);

        // Delivery also caught up the local view, no sync needed.
        assert!(bob
            .thread_by_peer_inbox(alice.inbox_id())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn messages_flow_and_history_keeps_membership_entry() {
        let net = MemoryTransport::new();
        let alice = connect(&net, &addr(1)).await;
        let bob = connect(&net, &addr(2)).await;

        let thread = alice.create_thread(bob.inbox_id()).await.unwrap();
        bob.sync_threads().await.unwrap();
        let bob_thread = bob
            .thread_by_peer_inbox(alice.inbox_id())
            .await
            .unwrap()
            .unwrap();

        let mut incoming = bob_thread.stream().await.unwrap();
        thread.send("gm").await.unwrap();

        let received = incoming.recv().await.unwrap().unwrap();
        assert_eq!(received.body, "gm");
        assert_eq!(&received.sender_inbox_id, alice.inbox_id());
        assert_eq!(received.kind, MessageKind::Application);

        let history = bob_thread.messages().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, MessageKind::Membership);
        assert_eq!(history[1].body, "gm");
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let net = MemoryTransport::new();
        let alice = connect(&net, &addr(1)).await;
        let bob = connect(&net, &addr(2)).await;
        let thread = alice.create_thread(bob.inbox_id()).await.unwrap();

        let body = "x".repeat(MAX_BODY_SIZE + 1);
        match thread.send(&body).await {
            Err(TransportError::BodyTooLarge { .. }) => {}
            other => panic!("expected BodyTooLarge, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_client_refuses_operations() {
        let net = MemoryTransport::new();
        let alice = connect(&net, &addr(1)).await;
        let bob = connect(&net, &addr(2)).await;
        let thread = alice.create_thread(bob.inbox_id()).await.unwrap();

        alice.close().await;
        alice.close().await; // idempotent

        assert!(matches!(
            alice.list_threads(true).await,
            Err(TransportError::ClientClosed)
        ));
        assert!(matches!(
            thread.send("late").await,
            Err(TransportError::ClientClosed)
        ));
    }

    #[tokio::test]
    async fn stopped_stream_delivers_nothing_further() {
        let net = MemoryTransport::new();
        let alice = connect(&net, &addr(1)).await;
        let bob = connect(&net, &addr(2)).await;

        let thread = alice.create_thread(bob.inbox_id()).await.unwrap();
        let mut incoming = thread.stream().await.unwrap();
        incoming.stop();
        tokio::task::yield_now().await;

        thread.send("after stop").await.unwrap();
        let outcome =
            tokio::time::timeout(Duration::from_millis(50), incoming.recv()).await;
        match outcome {
            Ok(None) | Err(_) => {}
            Ok(Some(item)) => panic!("unexpected item after stop: {item:?}"),
        }
    }
}
