//! Standing stream subscriptions.
//!
//! Each stream client owns an insertion-ordered list of subscriptions. A
//! subscription freezes its resolved procedure and decoded argument tuple at
//! creation and carries the last value sent to the client, so the tick loop
//! can suppress unchanged results. Keeping the cache slot inside the entry
//! makes "cached iff subscribed" hold by construction.

use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::protocol::{ClientId, Request, StreamId, Value};
use crate::service::{CallError, ProcedureHandle, ServiceRegistry};
use crate::transport::StreamClient;

/// Failure to establish a stream subscription.
///
/// Setup errors surface synchronously to the caller and never poison the
/// registry.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The RPC client has no stream channel peer.
    #[error("client has no stream channel")]
    NoStreamChannel,
    /// Procedure resolution or argument decoding failed.
    #[error(transparent)]
    Call(#[from] CallError),
}

/// One subscription with its last-sent result.
pub(crate) struct StreamEntry {
    pub id: StreamId,
    pub procedure: ProcedureHandle,
    pub arguments: Vec<Value>,
    /// `None` until the first send, and reset after an error update.
    pub last_sent: Option<Value>,
}

struct StreamClientState {
    client: Rc<dyn StreamClient>,
    /// Insertion-ordered; batches follow this order.
    entries: Vec<StreamEntry>,
    next_id: u32,
}

/// Active stream subscriptions, per stream client.
pub(crate) struct StreamRegistry {
    clients: HashMap<ClientId, StreamClientState>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    /// Registers a connected stream client with no subscriptions.
    pub fn add_client(&mut self, client: Rc<dyn StreamClient>) {
        self.clients.entry(client.id()).or_insert(StreamClientState {
            client,
            entries: Vec::new(),
            next_id: 0,
        });
    }

    /// Drops a stream client and all of its subscriptions.
    pub fn remove_client(&mut self, id: ClientId) -> Option<Rc<dyn StreamClient>> {
        self.clients.remove(&id).map(|state| state.client)
    }

    pub fn has_client(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    /// Creates a subscription for the stream peer of `client_id`.
    ///
    /// An existing subscription with the same procedure and decoded argument
    /// tuple is reused; equality is on decoded values, so two encodings of
    /// the same arguments deduplicate.
    pub fn add_stream(
        &mut self,
        registry: &dyn ServiceRegistry,
        client_id: ClientId,
        request: &Request,
    ) -> Result<StreamId, StreamError> {
        let state = self
            .clients
            .get_mut(&client_id)
            .ok_or(StreamError::NoStreamChannel)?;

        let procedure = registry.resolve(&request.service, &request.procedure)?;
        let arguments = registry.decode_arguments(&procedure, &request.arguments)?;

        if let Some(existing) = state
            .entries
            .iter()
            .find(|entry| entry.procedure == procedure && entry.arguments == arguments)
        {
            return Ok(existing.id);
        }

        let id = StreamId::new(state.next_id);
        state.next_id += 1;
        state.entries.push(StreamEntry {
            id,
            procedure,
            arguments,
            last_sent: None,
        });
        Ok(id)
    }

    /// Removes a subscription and its cached result. No error if the id is
    /// unknown.
    pub fn remove_stream(&mut self, client_id: ClientId, stream_id: StreamId) {
        if let Some(state) = self.clients.get_mut(&client_id) {
            state.entries.retain(|entry| entry.id != stream_id);
        }
    }

    /// Stream clients with their subscription lists, for the tick loop.
    pub fn clients_mut(
        &mut self,
    ) -> impl Iterator<Item = (Rc<dyn StreamClient>, &mut Vec<StreamEntry>)> + '_ {
        self.clients
            .values_mut()
            .map(|state| (state.client.clone(), &mut state.entries))
    }

    #[cfg(test)]
    fn entry_count(&self, client_id: ClientId) -> usize {
        self.clients
            .get(&client_id)
            .map_or(0, |state| state.entries.len())
    }
}
