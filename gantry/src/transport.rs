//! Transport collaborator interface.
//!
//! The engine never touches sockets or wire framing. Transports own their
//! connections and any I/O threads, and surface complete frames through the
//! client handle traits here. Handle methods are called only from the tick
//! thread and must return promptly; a transport that reads bytes on its own
//! threads hands frames over through thread-safe queues.
//!
//! Connection lifecycle flows the other way: each tick the engine drives
//! every attached transport's [`Transport::update`] maintenance pass and
//! applies the events it returns.

pub mod mem;

use std::rc::Rc;

use crate::protocol::{ClientId, Request, Response, StreamMessage};

/// RPC-side view of one connected client, owned by its transport.
///
/// The transport may mark the connection dead at any time; the engine
/// tolerates this by checking [`RpcClient::connected`] before executing.
pub trait RpcClient {
    fn id(&self) -> ClientId;

    /// Printable remote address.
    fn address(&self) -> String;

    fn connected(&self) -> bool;

    /// Whether a complete request frame is ready to read.
    fn data_available(&self) -> bool;

    /// Reads one request frame, if one is ready.
    fn read(&self) -> Option<Request>;

    /// Writes one response frame.
    fn write(&self, response: Response);
}

/// Stream-side view of one connected client.
///
/// Correlated to its RPC peer by the shared [`ClientId`].
pub trait StreamClient {
    fn id(&self) -> ClientId;

    /// Printable remote address.
    fn address(&self) -> String;

    fn connected(&self) -> bool;

    /// Writes one batched stream message.
    fn write(&self, message: StreamMessage);
}

/// Connection lifecycle notification drained by the engine each tick.
pub enum TransportEvent {
    RpcConnected(Rc<dyn RpcClient>),
    RpcDisconnected(ClientId),
    StreamConnected(Rc<dyn StreamClient>),
    StreamDisconnected(ClientId),
}

/// A transport attached to the engine.
pub trait Transport {
    /// Non-blocking maintenance pass: accept connections, progress
    /// handshakes. Returns the lifecycle events observed since the last
    /// call, in order.
    fn update(&mut self) -> Vec<TransportEvent>;

    /// Total bytes read from the wire since the transport started.
    fn bytes_read(&self) -> u64;

    /// Total bytes written to the wire since the transport started.
    fn bytes_written(&self) -> u64;
}
