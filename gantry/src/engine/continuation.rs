//! Resumable request execution.

use std::mem;
use std::rc::{Rc, Weak};

use crate::protocol::{ClientId, Request, Response};
use crate::service::{CallError, CallPoll, ProcedureCall, ServiceRegistry};
use crate::transport::RpcClient;

/// Progress report from running a continuation.
pub enum ContinuationPoll {
    /// Finished; send the response.
    Done(Response),
    /// Suspended. The continuation keeps its partial state; run it again on
    /// a later tick.
    Suspended,
}

enum State {
    /// Fresh from the wire; the procedure is resolved on first run.
    Fresh(Request),
    /// In flight; owns the state captured at the last suspension. The
    /// encoded request is gone by now.
    Running(Box<dyn ProcedureCall>),
    /// Ran to completion; must not be run again.
    Complete,
}

/// Owning handle for one request's execution.
///
/// Holds the originating client weakly so a disconnect discovered at any
/// point simply abandons the work. Mutated only by the single-threaded
/// executor that owns it.
pub struct RequestContinuation {
    client: Weak<dyn RpcClient>,
    client_id: ClientId,
    state: State,
}

impl RequestContinuation {
    pub fn new(client: &Rc<dyn RpcClient>, request: Request) -> Self {
        Self {
            client: Rc::downgrade(client),
            client_id: client.id(),
            state: State::Fresh(request),
        }
    }

    /// The originating client, if its transport still owns it.
    #[must_use]
    pub fn client(&self) -> Option<Rc<dyn RpcClient>> {
        self.client.upgrade()
    }

    /// Id of the originating client, valid even after disconnect.
    #[must_use]
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// True when this continuation resumed from a prior suspension.
    #[must_use]
    pub fn resumed(&self) -> bool {
        matches!(self.state, State::Running(_))
    }

    /// Attempts to complete the request.
    ///
    /// Resolution, decoding, and handler failures all become error
    /// responses; suspension preserves the in-flight call for the next run.
    pub fn run(&mut self, registry: &dyn ServiceRegistry) -> ContinuationPoll {
        let mut call = match mem::replace(&mut self.state, State::Complete) {
            State::Fresh(request) => match begin(registry, &request) {
                Ok(call) => call,
                Err(error) => {
                    return ContinuationPoll::Done(Response::error(error.client_message()));
                }
            },
            State::Running(call) => call,
            State::Complete => {
                return ContinuationPoll::Done(Response::error("request already completed"));
            }
        };

        match call.poll() {
            Ok(CallPoll::Return(value)) => match value.encode() {
                Ok(bytes) => ContinuationPoll::Done(Response::returning(bytes)),
                Err(error) => ContinuationPoll::Done(Response::error(error.to_string())),
            },
            Ok(CallPoll::Pending) => {
                self.state = State::Running(call);
                ContinuationPoll::Suspended
            }
            Err(error) => ContinuationPoll::Done(Response::error(error.client_message())),
        }
    }
}

/// Resolves the target and starts the call. The request's encoded bytes are
/// not retained past this point.
fn begin(
    registry: &dyn ServiceRegistry,
    request: &Request,
) -> Result<Box<dyn ProcedureCall>, CallError> {
    let procedure = registry.resolve(&request.service, &request.procedure)?;
    let arguments = registry.decode_arguments(&procedure, &request.arguments)?;
    Ok(registry.begin_call(&procedure, arguments))
}
