//! Shared harness for the end-to-end tick tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Once;
use std::time::Duration;

use gantry::engine::{current_client, current_scene, EngineObserver, RpcEngine};
use gantry::protocol::{ClientId, Request, Response, ResponseBody, Value};
use gantry::service::{CallError, CallPoll, ProcedureCall, ProcedureHandle, ServiceRegistry};
use gantry::transport::mem::{MemoryHub, MemoryTransport};
use gantry::transport::{RpcClient, StreamClient};
use gantry::EngineConfig;

static INIT_TRACING: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        gantry::init_tracing();
    });
}

/// State shared between the scripted registry and the test body.
#[derive(Default)]
pub struct TestState {
    /// Returned by the `value` procedure; mutate between ticks.
    pub value: Cell<i64>,
    /// One entry per handler poll: procedure name and the ambient client.
    pub log: RefCell<Vec<(String, Option<ClientId>)>>,
}

impl TestState {
    /// Client ids from the poll log, in order.
    pub fn polled_clients(&self) -> Vec<Option<ClientId>> {
        self.log.borrow().iter().map(|(_, id)| *id).collect()
    }

    pub fn clear_log(&self) {
        self.log.borrow_mut().clear();
    }
}

/// Scripted service registry exposing one `test` service.
///
/// Procedures:
/// - `echo`: returns its first argument
/// - `value`: returns the shared [`TestState::value`]
/// - `whoami`: returns the ambient client's address
/// - `scene`: returns the ambient scene name
/// - `sleep`: sleeps its argument in milliseconds, then returns it
/// - `yield_once`: suspends on the first poll, then returns 1
/// - `fail`: domain error
/// - `boom`: internal error with backtrace text
pub struct TestRegistry {
    pub state: Rc<TestState>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self {
            state: Rc::new(TestState::default()),
        }
    }
}

impl ServiceRegistry for TestRegistry {
    fn resolve(&self, service: &str, procedure: &str) -> Result<ProcedureHandle, CallError> {
        let known = [
            "echo",
            "value",
            "whoami",
            "scene",
            "sleep",
            "yield_once",
            "fail",
            "boom",
        ];
        if service == "test" && known.contains(&procedure) {
            Ok(ProcedureHandle::new(service, procedure))
        } else {
            Err(CallError::Domain(format!(
                "service {service} has no procedure {procedure}"
            )))
        }
    }

    fn decode_arguments(
        &self,
        _procedure: &ProcedureHandle,
        arguments: &[Vec<u8>],
    ) -> Result<Vec<Value>, CallError> {
        arguments
            .iter()
            .map(|bytes| Value::decode(bytes).map_err(|error| CallError::Domain(error.to_string())))
            .collect()
    }

    fn begin_call(
        &self,
        procedure: &ProcedureHandle,
        arguments: Vec<Value>,
    ) -> Box<dyn ProcedureCall> {
        let state = self.state.clone();
        let name = procedure.procedure().to_owned();
        match procedure.procedure() {
            "echo" => Box::new(move || {
                log_poll(&state, &name);
                Ok(CallPoll::Return(arguments[0].clone()))
            }),
            "value" => Box::new(move || {
                log_poll(&state, &name);
                Ok(CallPoll::Return(Value::Int(state.value.get())))
            }),
            "whoami" => Box::new(move || {
                log_poll(&state, &name);
                let address = current_client()
                    .map(|client| client.address())
                    .unwrap_or_default();
                Ok(CallPoll::Return(Value::String(address)))
            }),
            "scene" => Box::new(move || {
                log_poll(&state, &name);
                let scene = current_scene()
                    .map(|scene| scene.name().to_owned())
                    .unwrap_or_default();
                Ok(CallPoll::Return(Value::String(scene)))
            }),
            "sleep" => Box::new(move || {
                log_poll(&state, &name);
                let Some(Value::UInt(millis)) = arguments.first() else {
                    return Err(CallError::Domain("sleep takes milliseconds".into()));
                };
                std::thread::sleep(Duration::from_millis(*millis));
                Ok(CallPoll::Return(Value::UInt(*millis)))
            }),
            "yield_once" => {
                let mut suspended = false;
                Box::new(move || {
                    log_poll(&state, &name);
                    if suspended {
                        Ok(CallPoll::Return(Value::Int(1)))
                    } else {
                        suspended = true;
                        Ok(CallPoll::Pending)
                    }
                })
            }
            "fail" => Box::new(move || {
                log_poll(&state, &name);
                Err(CallError::Domain("stale vessel handle".into()))
            }),
            "boom" => Box::new(move || {
                log_poll(&state, &name);
                Err(CallError::Internal {
                    message: "handler panicked".into(),
                    backtrace: "at test_registry".into(),
                })
            }),
            _ => Box::new(move || Err(CallError::Domain(format!("unreachable: {name}")))),
        }
    }
}

fn log_poll(state: &TestState, procedure: &str) {
    let client = current_client().map(|client| client.id());
    state
        .log
        .borrow_mut()
        .push((procedure.to_owned(), client));
}

/// Observer counting every lifecycle hook.
#[derive(Default)]
pub struct CountingObserver {
    pub rpc_connected: Cell<u32>,
    pub rpc_disconnected: Cell<u32>,
    pub stream_connected: Cell<u32>,
    pub stream_disconnected: Cell<u32>,
    pub activity: Cell<u32>,
}

impl EngineObserver for CountingObserver {
    fn rpc_client_connected(&self, _client: &dyn RpcClient) {
        self.rpc_connected.set(self.rpc_connected.get() + 1);
    }

    fn rpc_client_disconnected(&self, _client: &dyn RpcClient) {
        self.rpc_disconnected.set(self.rpc_disconnected.get() + 1);
    }

    fn stream_client_connected(&self, _client: &dyn StreamClient) {
        self.stream_connected.set(self.stream_connected.get() + 1);
    }

    fn stream_client_disconnected(&self, _client: &dyn StreamClient) {
        self.stream_disconnected.set(self.stream_disconnected.get() + 1);
    }

    fn client_activity(&self, _client: &dyn RpcClient) {
        self.activity.set(self.activity.get() + 1);
    }
}

/// Engine wired to an in-memory transport and the scripted registry.
pub struct Harness {
    pub engine: RpcEngine,
    pub hub: MemoryHub,
    pub state: Rc<TestState>,
    pub time: Rc<Cell<f64>>,
    pub observer: Rc<CountingObserver>,
}

impl Harness {
    pub fn new(config: EngineConfig) -> Self {
        init_test_tracing();

        let registry = TestRegistry::new();
        let state = registry.state.clone();

        let time = Rc::new(Cell::new(0.0));
        let clock_time = time.clone();

        let mut engine = RpcEngine::new(
            Rc::new(registry),
            Rc::new(move || clock_time.get()),
            config,
        );

        let observer = Rc::new(CountingObserver::default());
        engine.add_observer(observer.clone());

        let (transport, hub) = MemoryTransport::new();
        engine.attach(Box::new(transport));

        Self {
            engine,
            hub,
            state,
            time,
            observer,
        }
    }

    /// Advances universal time and runs one tick.
    pub fn tick_at(&mut self, time: f64) {
        self.time.set(time);
        self.engine.tick();
    }
}

/// Builds a `test.<procedure>` request with encoded arguments.
pub fn request(procedure: &str, arguments: Vec<Value>) -> Request {
    Request::new(
        "test",
        procedure,
        arguments
            .iter()
            .map(|value| value.encode().unwrap())
            .collect(),
    )
}

/// Unwraps a successful response into its decoded return value.
pub fn return_value(response: &Response) -> Value {
    match &response.body {
        ResponseBody::Return(bytes) => Value::decode(bytes).unwrap(),
        ResponseBody::Error(message) => panic!("expected return value, got error: {message}"),
    }
}

/// Unwraps an error response into its message.
pub fn error_message(response: &Response) -> &str {
    match &response.body {
        ResponseBody::Error(message) => message,
        ResponseBody::Return(_) => panic!("expected error, got return value"),
    }
}
