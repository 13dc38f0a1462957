//! Lifecycle and activity notifications.

use crate::transport::{RpcClient, StreamClient};

/// Observer of client lifecycle and activity.
///
/// All hooks run on the tick thread, synchronously with the event; an
/// observer must not call back into the engine's mutating operations.
/// Register observers before connections are accepted.
pub trait EngineObserver {
    fn rpc_client_connected(&self, _client: &dyn RpcClient) {}

    fn rpc_client_disconnected(&self, _client: &dyn RpcClient) {}

    fn stream_client_connected(&self, _client: &dyn StreamClient) {}

    fn stream_client_disconnected(&self, _client: &dyn StreamClient) {}

    /// One request frame was read from `client`.
    fn client_activity(&self, _client: &dyn RpcClient) {}
}
