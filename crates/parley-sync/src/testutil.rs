//! Test doubles shared across the sync test modules: a scriptable client and
//! thread for forcing interleavings the live transport cannot, plus helpers
//! for the live `MemoryTransport` path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use parley_shared::{
    Address, InboxId, Message, MessageId, MessageKind, SignerError, ThreadId, ThreadInfo,
    TransportError,
};
use parley_transport::{
    stream, MemoryTransport, MessageStream, MessagingClient, Signer, StreamItem, ThreadHandle,
    ThreadStream, Transport,
};

struct ApprovingSigner;

#[async_trait]
impl Signer for ApprovingSigner {
    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        Ok(message.to_vec())
    }
}

/// Register an identity on the in-memory transport and return its client.
pub async fn register(net: &MemoryTransport, address: &Address) -> Arc<dyn MessagingClient> {
    net.create(address, &ApprovingSigner)
        .await
        .expect("registration on the in-memory transport")
}

pub fn app_message(id: &str, thread: &str, sender: &str, body: &str) -> Message {
    Message {
        id: MessageId(id.into()),
        thread_id: ThreadId(thread.into()),
        sender_inbox_id: InboxId(sender.into()),
        sent_at_ns: Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_default(),
        kind: MessageKind::Application,
        body: body.into(),
    }
}

pub fn membership_message(id: &str, thread: &str) -> Message {
    Message {
        kind: MessageKind::Membership,
        body: String::new(),
        ..app_message(id, thread, "network", "")
    }
}

pub fn make_thread(id: &str, peer: &str) -> Arc<dyn ThreadHandle> {
    Arc::new(FakeThread::new(id, peer))
}

/// A thread whose history and stream are driven directly by the test.
pub struct FakeThread {
    id: ThreadId,
    peer: InboxId,
    created_at: DateTime<Utc>,
    history: Mutex<Vec<Message>>,
    sent: Mutex<Vec<String>>,
    taps: Mutex<Vec<mpsc::Sender<StreamItem<Message>>>>,
    pub fail_messages: AtomicBool,
    pub fail_send: AtomicBool,
}

impl FakeThread {
    pub fn new(id: &str, peer: &str) -> Self {
        Self {
            id: ThreadId(id.into()),
            peer: InboxId(peer.into()),
            created_at: Utc::now(),
            history: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            taps: Mutex::new(Vec::new()),
            fail_messages: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
        }
    }

    /// Append to the backing history without emitting a stream event.
    pub fn push_history(&self, message: Message) {
        self.history.lock().unwrap().push(message);
    }

    /// Emit a stream event without touching the backing history.
    pub async fn inject(&self, message: Message) {
        let taps: Vec<_> = self.taps.lock().unwrap().clone();
        for tap in taps {
            let _ = tap.send(Ok(message.clone())).await;
        }
    }

    pub fn sent_bodies(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ThreadHandle for FakeThread {
    fn info(&self) -> ThreadInfo {
        ThreadInfo {
            id: self.id.clone(),
            peer_inbox_id: self.peer.clone(),
            created_at: self.created_at,
            updated_at: self.created_at,
            active: true,
        }
    }

    async fn messages(&self) -> Result<Vec<Message>, TransportError> {
        if self.fail_messages.load(Ordering::SeqCst) {
            return Err(TransportError::Other("scripted history failure".into()));
        }
        Ok(self.history.lock().unwrap().clone())
    }

    async fn send(&self, body: &str) -> Result<(), TransportError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(TransportError::Unreachable("scripted send failure".into()));
        }
        self.sent.lock().unwrap().push(body.to_string());
        Ok(())
    }

    async fn stream(&self) -> Result<MessageStream, TransportError> {
        let (tx, _stop_rx, sub) = stream::subscription_channel(16);
        self.taps.lock().unwrap().push(tx);
        Ok(sub)
    }
}

/// A client with scripted lookups and call counters, for pinning down the
/// resolver's exact protocol and the engines' failure handling.
pub struct FakeClient {
    inbox: InboxId,
    address: Address,
    directory: Mutex<HashMap<Address, InboxId>>,
    threads_by_peer: Mutex<HashMap<InboxId, Arc<dyn ThreadHandle>>>,
    initial: Mutex<Vec<Arc<dyn ThreadHandle>>>,
    taps: Mutex<Vec<mpsc::Sender<StreamItem<Arc<dyn ThreadHandle>>>>>,
    pub fail_initial_list: AtomicBool,
    pub fail_stream_open: AtomicBool,
    /// Number of upcoming `thread_by_peer_inbox` calls forced to miss.
    pub lookup_misses: AtomicUsize,
    pub sync_calls: AtomicUsize,
    pub lookup_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
}

impl FakeClient {
    pub fn new(inbox: &str) -> Self {
        Self {
            inbox: InboxId(inbox.into()),
            address: Address([0xaa; 20]),
            directory: Mutex::new(HashMap::new()),
            threads_by_peer: Mutex::new(HashMap::new()),
            initial: Mutex::new(Vec::new()),
            taps: Mutex::new(Vec::new()),
            fail_initial_list: AtomicBool::new(false),
            fail_stream_open: AtomicBool::new(false),
            lookup_misses: AtomicUsize::new(0),
            sync_calls: AtomicUsize::new(0),
            lookup_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
        }
    }

    /// Make an address resolvable to an inbox.
    pub fn register_peer(&self, address: &Address, inbox: &str) -> InboxId {
        let inbox = InboxId(inbox.into());
        self.directory
            .lock()
            .unwrap()
            .insert(address.clone(), inbox.clone());
        inbox
    }

    /// Pre-existing thread with the given peer, visible to lookups.
    pub fn add_thread_for(&self, peer: &InboxId, id: &str) -> Arc<dyn ThreadHandle> {
        let thread: Arc<dyn ThreadHandle> = Arc::new(FakeThread::new(id, &peer.0));
        self.threads_by_peer
            .lock()
            .unwrap()
            .insert(peer.clone(), thread.clone());
        thread
    }

    /// Thread returned by the bulk list.
    pub fn seed_initial(&self, thread: Arc<dyn ThreadHandle>) {
        self.initial.lock().unwrap().push(thread);
    }

    /// Emit a thread on every open stream.
    pub async fn inject_thread(&self, thread: Arc<dyn ThreadHandle>) {
        let taps: Vec<_> = self.taps.lock().unwrap().clone();
        for tap in taps {
            let _ = tap.send(Ok(thread.clone())).await;
        }
    }

    /// Emit a non-terminal error on every open stream.
    pub async fn inject_thread_error(&self, message: &str) {
        let taps: Vec<_> = self.taps.lock().unwrap().clone();
        for tap in taps {
            let _ = tap.send(Err(TransportError::Other(message.into()))).await;
        }
    }
}

#[async_trait]
impl MessagingClient for FakeClient {
    fn inbox_id(&self) -> &InboxId {
        &self.inbox
    }

    fn address(&self) -> &Address {
        &self.address
    }

    async fn find_inbox_by_address(
        &self,
        address: &Address,
    ) -> Result<Option<InboxId>, TransportError> {
        Ok(self.directory.lock().unwrap().get(address).cloned())
    }

    async fn list_threads(
        &self,
        _active_only: bool,
    ) -> Result<Vec<Arc<dyn ThreadHandle>>, TransportError> {
        if self.fail_initial_list.load(Ordering::SeqCst) {
            return Err(TransportError::Unreachable("scripted list failure".into()));
        }
        Ok(self.initial.lock().unwrap().clone())
    }

    async fn sync_threads(&self) -> Result<(), TransportError> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn thread_by_peer_inbox(
        &self,
        peer: &InboxId,
    ) -> Result<Option<Arc<dyn ThreadHandle>>, TransportError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        if self.lookup_misses.load(Ordering::SeqCst) > 0 {
            self.lookup_misses.fetch_sub(1, Ordering::SeqCst);
            return Ok(None);
        }
        Ok(self.threads_by_peer.lock().unwrap().get(peer).cloned())
    }

    async fn create_thread(
        &self,
        peer: &InboxId,
    ) -> Result<Arc<dyn ThreadHandle>, TransportError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let thread: Arc<dyn ThreadHandle> =
            Arc::new(FakeThread::new(&format!("t-{}", peer.0), &peer.0));
        self.threads_by_peer
            .lock()
            .unwrap()
            .insert(peer.clone(), thread.clone());
        Ok(thread)
    }

    async fn stream_threads(&self) -> Result<ThreadStream, TransportError> {
        if self.fail_stream_open.load(Ordering::SeqCst) {
            return Err(TransportError::Unreachable(
                "scripted stream-open failure".into(),
            ));
        }
        let (tx, _stop_rx, sub) = stream::subscription_channel(16);
        self.taps.lock().unwrap().push(tx);
        Ok(sub)
    }

    async fn close(&self) {}
}
