//! Game-tick-bound RPC execution engine.
//!
//! A host simulation hands the engine a bounded time budget every tick; the
//! engine fairly dispatches pending requests from connected clients, runs
//! them to completion or cooperative suspension, and re-evaluates standing
//! stream subscriptions, pushing results only when they change. Sockets,
//! wire framing, and the procedure catalogue are collaborators consumed
//! through the [`transport`] and [`service`] interfaces.

pub mod engine;
pub mod protocol;
pub mod service;
pub mod timing;
pub mod transport;

mod trace;

pub use engine::{EngineConfig, EngineObserver, RpcEngine, Scene, StreamError};
pub use trace::init_tracing;
