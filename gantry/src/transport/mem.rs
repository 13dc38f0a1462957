//! In-memory transport.
//!
//! Backs the test suite and in-process embedding without sockets. Frames
//! cross thread-safe queues, so a producer thread may feed a client's inbox
//! while the engine polls it from the tick thread.
//!
//! The transport half is attached to the engine; the [`MemoryHub`] half stays
//! with the caller and mints connected client pairs whose events surface on
//! the next [`Transport::update`] pass.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::protocol::{ClientId, Request, Response, StreamMessage};
use crate::transport::{RpcClient, StreamClient, Transport, TransportEvent};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn frame_len<T: serde::Serialize>(frame: &T) -> u64 {
    postcard::to_allocvec(frame).map_or(0, |bytes| bytes.len() as u64)
}

/// State shared between a client pair and its driving [`MemoryClient`].
struct Shared {
    id: ClientId,
    address: String,
    streaming: bool,
    connected: AtomicBool,
    inbox: Mutex<VecDeque<Request>>,
    responses: Mutex<Vec<Response>>,
    stream_messages: Mutex<Vec<StreamMessage>>,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

struct HubState {
    staged: RefCell<Vec<TransportEvent>>,
    clients: RefCell<Vec<Arc<Shared>>>,
}

/// Engine-side half; attach to the engine.
pub struct MemoryTransport {
    hub: Rc<HubState>,
}

/// Caller-side half; connects clients at any time.
#[derive(Clone)]
pub struct MemoryHub {
    hub: Rc<HubState>,
}

impl MemoryTransport {
    /// Creates the transport and its hub handle.
    #[must_use]
    pub fn new() -> (Self, MemoryHub) {
        let hub = Rc::new(HubState {
            staged: RefCell::new(Vec::new()),
            clients: RefCell::new(Vec::new()),
        });
        (Self { hub: hub.clone() }, MemoryHub { hub })
    }
}

impl Transport for MemoryTransport {
    fn update(&mut self) -> Vec<TransportEvent> {
        self.hub.staged.borrow_mut().drain(..).collect()
    }

    fn bytes_read(&self) -> u64 {
        self.hub
            .clients
            .borrow()
            .iter()
            .map(|shared| shared.bytes_read.load(Ordering::Relaxed))
            .sum()
    }

    fn bytes_written(&self) -> u64 {
        self.hub
            .clients
            .borrow()
            .iter()
            .map(|shared| shared.bytes_written.load(Ordering::Relaxed))
            .sum()
    }
}

impl MemoryHub {
    /// Connects a client with both an RPC channel and a stream peer.
    pub fn connect(&self, address: &str) -> MemoryClient {
        self.connect_inner(address, true)
    }

    /// Connects a client with no stream peer.
    pub fn connect_rpc_only(&self, address: &str) -> MemoryClient {
        self.connect_inner(address, false)
    }

    fn connect_inner(&self, address: &str, streaming: bool) -> MemoryClient {
        let shared = Arc::new(Shared {
            id: ClientId::generate(),
            address: address.to_owned(),
            streaming,
            connected: AtomicBool::new(true),
            inbox: Mutex::new(VecDeque::new()),
            responses: Mutex::new(Vec::new()),
            stream_messages: Mutex::new(Vec::new()),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
        });
        self.hub.clients.borrow_mut().push(shared.clone());

        let mut staged = self.hub.staged.borrow_mut();
        staged.push(TransportEvent::RpcConnected(Rc::new(RpcHandle(
            shared.clone(),
        ))));
        if streaming {
            staged.push(TransportEvent::StreamConnected(Rc::new(StreamHandle(
                shared.clone(),
            ))));
        }
        drop(staged);

        MemoryClient {
            shared,
            hub: self.hub.clone(),
        }
    }
}

struct RpcHandle(Arc<Shared>);

impl RpcClient for RpcHandle {
    fn id(&self) -> ClientId {
        self.0.id
    }

    fn address(&self) -> String {
        self.0.address.clone()
    }

    fn connected(&self) -> bool {
        self.0.connected.load(Ordering::Relaxed)
    }

    fn data_available(&self) -> bool {
        !lock(&self.0.inbox).is_empty()
    }

    fn read(&self) -> Option<Request> {
        lock(&self.0.inbox).pop_front()
    }

    fn write(&self, response: Response) {
        if !self.connected() {
            return;
        }
        self.0
            .bytes_written
            .fetch_add(frame_len(&response), Ordering::Relaxed);
        lock(&self.0.responses).push(response);
    }
}

struct StreamHandle(Arc<Shared>);

impl StreamClient for StreamHandle {
    fn id(&self) -> ClientId {
        self.0.id
    }

    fn address(&self) -> String {
        self.0.address.clone()
    }

    fn connected(&self) -> bool {
        self.0.connected.load(Ordering::Relaxed)
    }

    fn write(&self, message: StreamMessage) {
        if !self.connected() {
            return;
        }
        self.0
            .bytes_written
            .fetch_add(frame_len(&message), Ordering::Relaxed);
        lock(&self.0.stream_messages).push(message);
    }
}

/// Caller-side handle for driving one connected client pair.
pub struct MemoryClient {
    shared: Arc<Shared>,
    hub: Rc<HubState>,
}

impl MemoryClient {
    #[must_use]
    pub fn id(&self) -> ClientId {
        self.shared.id
    }

    /// Delivers a request frame into the client's inbox.
    pub fn send(&self, request: Request) {
        self.shared
            .bytes_read
            .fetch_add(frame_len(&request), Ordering::Relaxed);
        lock(&self.shared.inbox).push_back(request);
    }

    /// Drains the responses written by the engine so far.
    pub fn take_responses(&self) -> Vec<Response> {
        lock(&self.shared.responses).drain(..).collect()
    }

    /// Drains the stream messages written by the engine so far.
    pub fn take_stream_messages(&self) -> Vec<StreamMessage> {
        lock(&self.shared.stream_messages).drain(..).collect()
    }

    /// Marks the connection dead and stages the disconnect events.
    ///
    /// Idempotent. The engine observes the drop on its next maintenance
    /// pass, or earlier through [`RpcClient::connected`].
    pub fn disconnect(&self) {
        if self.shared.connected.swap(false, Ordering::Relaxed) {
            let mut staged = self.hub.staged.borrow_mut();
            staged.push(TransportEvent::RpcDisconnected(self.shared.id));
            if self.shared.streaming {
                staged.push(TransportEvent::StreamDisconnected(self.shared.id));
            }
        }
    }
}
