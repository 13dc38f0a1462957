//! The tick-driven RPC execution engine.
//!
//! # Architecture
//!
//! The engine is single-threaded and cooperatively scheduled: the host
//! simulation calls [`RpcEngine::tick`] once per frame, and everything the
//! engine owns is mutated only on that thread. Transports may run their own
//! I/O threads, but frames reach the engine through the handle traits in
//! [`crate::transport`], which are only consulted from the tick thread.
//!
//! Per tick, in order:
//!
//! 1. **Maintenance**: every attached transport runs a non-blocking
//!    update pass; connect/disconnect events are applied to the scheduler,
//!    the client map, and the stream registry.
//! 2. **RPC loop**: rounds of poll-then-execute against the tick budget.
//!    The poll phase reads at most one request per client, visiting clients
//!    in round-robin order and skipping any client that already has an
//!    outstanding continuation. The execute phase drains the continuation
//!    queue: completed requests are answered, suspended ones carry over to
//!    the next tick, and work for disconnected clients is dropped. When the
//!    budget expires mid-queue the remainder carries over unexecuted.
//! 3. **Stream loop**: every standing subscription is re-evaluated; results
//!    that differ from the last sent value are batched into one message per
//!    stream client.
//! 4. **Accounting**: EMAs fold in the measured phase times, and the
//!    adaptive controller retunes the budget toward the target frame period.
//!
//! # Ordering guarantees
//!
//! Within one client, requests execute in arrival order. Across clients, the
//! round-robin cursor rotates once per tick, so no client keeps the
//! first-served slot. Within a stream batch, responses follow subscription
//! insertion order.

pub mod config;
mod context;
mod continuation;
mod events;
mod scheduler;
mod stats;
mod streams;

use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use minstant::Instant;

use crate::protocol::{ClientId, Request, Response, StreamId, StreamMessage, StreamResponse};
use crate::service::{CallPoll, ServiceRegistry};
use crate::timing::{Micros, PhaseTimer, TickBudget, UniversalClock};
use crate::trace::{debug, debug_enabled, info, warn};
use crate::transport::{RpcClient, Transport, TransportEvent};

pub use config::EngineConfig;
pub use context::{current_client, current_scene, Scene};
pub use events::EngineObserver;
pub use stats::{EngineStats, StatsSnapshot};
pub use streams::StreamError;

use context::CallScope;
use continuation::{ContinuationPoll, RequestContinuation};
use scheduler::RoundRobin;
use stats::RateController;
use streams::StreamRegistry;

/// Handle identifying an attached transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportId(u64);

/// The RPC execution engine.
///
/// Construct one per host and drive it with [`RpcEngine::tick`]. Procedure
/// handlers reach the current activation through [`current_client`] and
/// [`current_scene`].
pub struct RpcEngine {
    config: EngineConfig,
    registry: Rc<dyn ServiceRegistry>,
    clock: Rc<dyn UniversalClock>,
    transports: Vec<(TransportId, Box<dyn Transport>)>,
    next_transport_id: u64,
    clients: HashMap<ClientId, Rc<dyn RpcClient>>,
    scheduler: RoundRobin<ClientId>,
    /// Continuations ready for this tick's execute phase. Carries yielded
    /// work over from the previous tick.
    queue: Vec<RequestContinuation>,
    streams: StreamRegistry,
    stats: EngineStats,
    controller: RateController,
    observers: Vec<Rc<dyn EngineObserver>>,
    scene: Option<Scene>,
    last_tick: Option<Instant>,
}

impl RpcEngine {
    #[must_use]
    pub fn new(
        registry: Rc<dyn ServiceRegistry>,
        clock: Rc<dyn UniversalClock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            config,
            registry,
            clock,
            transports: Vec::new(),
            next_transport_id: 0,
            clients: HashMap::new(),
            scheduler: RoundRobin::new(),
            queue: Vec::new(),
            streams: StreamRegistry::new(),
            stats: EngineStats::new(),
            controller: RateController::new(),
            observers: Vec::new(),
            scene: None,
            last_tick: None,
        }
    }

    /// Attaches a transport; its clients join the engine on the next tick.
    pub fn attach(&mut self, transport: Box<dyn Transport>) -> TransportId {
        let id = TransportId(self.next_transport_id);
        self.next_transport_id += 1;
        self.transports.push((id, transport));
        id
    }

    /// Detaches a transport, returning it to the caller.
    ///
    /// Clients it owned stop being polled once their disconnect events have
    /// been applied or their handles report disconnected.
    pub fn detach(&mut self, id: TransportId) -> Option<Box<dyn Transport>> {
        let position = self
            .transports
            .iter()
            .position(|(candidate, _)| *candidate == id)?;
        Some(self.transports.remove(position).1)
    }

    /// Registers a lifecycle observer. Call before attaching transports.
    pub fn add_observer(&mut self, observer: Rc<dyn EngineObserver>) {
        self.observers.push(observer);
    }

    /// Sets the scene reported to handlers; call at most once per tick.
    pub fn set_scene(&mut self, scene: Option<Scene>) {
        self.scene = scene;
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Mutable access for runtime reconfiguration.
    pub fn config_mut(&mut self) -> &mut EngineConfig {
        &mut self.config
    }

    /// Point-in-time copy of the statistics surface.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Resets counters and smoothed values.
    pub fn clear_stats(&mut self) {
        self.stats.clear();
    }

    /// Creates a stream subscription for the stream peer of `client`.
    ///
    /// Identical subscriptions (same procedure, same decoded arguments)
    /// share one id. Setup failures surface here and leave no trace.
    pub fn add_stream(
        &mut self,
        client: ClientId,
        request: &Request,
    ) -> Result<StreamId, StreamError> {
        let id = self
            .streams
            .add_stream(self.registry.as_ref(), client, request)?;
        if debug_enabled() {
            debug!(client = %client, stream = %id, procedure = %request.procedure, "stream added");
        }
        Ok(id)
    }

    /// Removes a stream subscription. No error if the id is unknown.
    pub fn remove_stream(&mut self, client: ClientId, stream_id: StreamId) {
        self.streams.remove_stream(client, stream_id);
        if debug_enabled() {
            debug!(client = %client, stream = %stream_id, "stream removed");
        }
    }

    /// Runs one tick: transport maintenance, the RPC loop, the stream loop,
    /// then statistics and budget retuning.
    pub fn tick(&mut self) {
        let tick_started = Instant::now();
        let interval_secs = self
            .last_tick
            .map_or(0.0, |last| tick_started.duration_since(last).as_secs_f64());
        self.last_tick = Some(tick_started);

        self.update_rpc();
        self.update_streams();

        let bytes_read: u64 = self.transports.iter().map(|(_, t)| t.bytes_read()).sum();
        let bytes_written: u64 = self.transports.iter().map(|(_, t)| t.bytes_written()).sum();
        self.stats
            .record_interval(bytes_read, bytes_written, interval_secs);

        // The measured tick is the host frame period, so the controller sees
        // the whole frame it is trying to protect, not just our share of it.
        if self.config.adaptive_rate_control && interval_secs > 0.0 {
            self.config.max_time_per_update = self.controller.adjust(
                self.config.max_time_per_update,
                interval_secs,
                self.stats.exec_time_per_rpc_update(),
            );
        }
    }

    /// One pass of the RPC loop: poll/execute rounds against the budget.
    fn update_rpc(&mut self) {
        let budget = TickBudget::start(self.config.max_time_per_update);
        let mut poll_timer = PhaseTimer::new();
        let mut exec_timer = PhaseTimer::new();
        let mut yielded: Vec<RequestContinuation> = Vec::new();
        let mut executed: u32 = 0;

        self.update_transports();

        loop {
            // Poll phase. In blocking mode, keep polling until a request
            // arrives, the receive timeout elapses, or the budget runs out.
            poll_timer.start();
            let poll_started = Instant::now();
            loop {
                self.poll_requests(&yielded);
                if !self.config.blocking_recv {
                    break;
                }
                if !self.queue.is_empty() {
                    break;
                }
                if Micros::from_duration(poll_started.elapsed()) > self.config.recv_timeout {
                    break;
                }
                if budget.exhausted() {
                    break;
                }
            }
            poll_timer.stop();

            if self.queue.is_empty() {
                break;
            }

            // Execute phase. The continuation in flight when the budget
            // expires finishes; the rest of the queue carries over.
            exec_timer.start();
            let continuations = mem::take(&mut self.queue);
            for mut continuation in continuations {
                let Some(client) = continuation.client() else {
                    continue;
                };
                if !client.connected() {
                    // Dropped silently; the transport reports the disconnect.
                    continue;
                }
                if budget.exhausted() {
                    yielded.push(continuation);
                    continue;
                }
                executed += 1;
                let scope = CallScope::enter(Some(client.clone()), self.scene.clone());
                let poll = continuation.run(self.registry.as_ref());
                drop(scope);
                match poll {
                    ContinuationPoll::Done(response) => self.send_response(&client, response),
                    ContinuationPoll::Suspended => yielded.push(continuation),
                }
            }
            exec_timer.stop();

            if self.config.one_rpc_per_update {
                break;
            }
            if budget.exhausted() {
                break;
            }
        }

        // Yielded work becomes the queue for the next tick, and the cursor
        // rotates so the next tick's rounds start one client later.
        self.queue = yielded;
        self.scheduler.rotate();

        self.stats.record_rpc_update(
            executed,
            budget.elapsed(),
            poll_timer.elapsed(),
            exec_timer.elapsed(),
        );
    }

    /// Reads at most one request per idle client, in round order.
    fn poll_requests(&mut self, yielded: &[RequestContinuation]) {
        if self.scheduler.is_empty() {
            return;
        }

        // At most one outstanding continuation per client, across both the
        // active queue and the yielded list.
        let mut busy: Vec<ClientId> = Vec::with_capacity(self.queue.len() + yielded.len());
        busy.extend(self.queue.iter().map(RequestContinuation::client_id));
        busy.extend(yielded.iter().map(RequestContinuation::client_id));

        for client_id in self.scheduler.round() {
            if self.config.one_rpc_per_update && !self.queue.is_empty() {
                break;
            }
            if busy.contains(&client_id) {
                continue;
            }
            let Some(client) = self.clients.get(&client_id).cloned() else {
                continue;
            };
            if !client.connected() || !client.data_available() {
                continue;
            }
            let Some(request) = client.read() else {
                warn!(client = %client.address(), "data available but no frame read");
                continue;
            };
            for observer in &self.observers {
                observer.client_activity(client.as_ref());
            }
            if debug_enabled() {
                debug!(
                    client = %client.address(),
                    service = %request.service,
                    procedure = %request.procedure,
                    "request received"
                );
            }
            self.queue.push(RequestContinuation::new(&client, request));
        }
    }

    fn send_response(&self, client: &Rc<dyn RpcClient>, mut response: Response) {
        response.time = self.clock.universal_time();
        if debug_enabled() {
            debug!(
                client = %client.address(),
                error = response.has_error(),
                "response sent"
            );
        }
        client.write(response);
    }

    /// Drives every attached transport's maintenance pass and applies the
    /// lifecycle events it reports.
    fn update_transports(&mut self) {
        let mut events = Vec::new();
        for (_, transport) in &mut self.transports {
            events.append(&mut transport.update());
        }
        for event in events {
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::RpcConnected(client) => {
                let id = client.id();
                info!(client = %client.address(), id = %id, "rpc client connected");
                self.scheduler.add(id);
                for observer in &self.observers {
                    observer.rpc_client_connected(client.as_ref());
                }
                self.clients.insert(id, client);
            }
            TransportEvent::RpcDisconnected(id) => {
                self.scheduler.remove(&id);
                if let Some(client) = self.clients.remove(&id) {
                    info!(client = %client.address(), id = %id, "rpc client disconnected");
                    for observer in &self.observers {
                        observer.rpc_client_disconnected(client.as_ref());
                    }
                }
            }
            TransportEvent::StreamConnected(client) => {
                info!(client = %client.address(), "stream client connected");
                for observer in &self.observers {
                    observer.stream_client_connected(client.as_ref());
                }
                self.streams.add_client(client);
            }
            TransportEvent::StreamDisconnected(id) => {
                if let Some(client) = self.streams.remove_client(id) {
                    info!(client = %client.address(), "stream client disconnected");
                    for observer in &self.observers {
                        observer.stream_client_disconnected(client.as_ref());
                    }
                }
            }
        }
    }

    /// One pass of the stream loop: re-evaluate every subscription and send
    /// one batch per client containing only changed results.
    fn update_streams(&mut self) {
        let started = Instant::now();
        let mut executed: u32 = 0;

        for (client, entries) in self.streams.clients_mut() {
            if entries.is_empty() || !client.connected() {
                continue;
            }
            let mut message = StreamMessage::new();
            for entry in entries.iter_mut() {
                executed += 1;
                let scope = CallScope::enter(None, self.scene.clone());
                let mut call = self
                    .registry
                    .begin_call(&entry.procedure, entry.arguments.clone());
                let outcome = call.poll();
                drop(scope);

                let mut response = match outcome {
                    Ok(CallPoll::Return(value)) => {
                        if entry.last_sent.as_ref() == Some(&value) {
                            continue;
                        }
                        match value.encode() {
                            Ok(bytes) => {
                                entry.last_sent = Some(value);
                                Response::returning(bytes)
                            }
                            Err(error) => {
                                entry.last_sent = None;
                                Response::error(error.to_string())
                            }
                        }
                    }
                    // Streams never suspend; a procedure that is not ready is
                    // reported to the subscriber as an error.
                    Ok(CallPoll::Pending) => {
                        entry.last_sent = None;
                        Response::error(format!(
                            "stream procedure {} is not ready",
                            entry.procedure
                        ))
                    }
                    Err(error) => {
                        entry.last_sent = None;
                        Response::error(error.client_message())
                    }
                };
                response.time = self.clock.universal_time();
                message.responses.push(StreamResponse {
                    id: entry.id,
                    response,
                });
            }
            if !message.is_empty() {
                client.write(message);
            }
        }

        self.stats
            .record_stream_update(executed, Micros::from_duration(started.elapsed()));
    }
}
