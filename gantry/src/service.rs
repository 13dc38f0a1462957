//! Service registry collaborator interface.
//!
//! The engine resolves `(service, procedure)` names, decodes arguments, and
//! dispatches calls through this interface; the registry implementation and
//! the procedures themselves live with the host. A call is driven by polling:
//! a procedure that is not ready returns [`CallPoll::Pending`] and is polled
//! again on a later tick with its partial state preserved.

use core::fmt;

use thiserror::Error;

use crate::protocol::Value;

/// Resolved handle for one `(service, procedure)` pair.
///
/// Handles compare equal when they name the same procedure; stream
/// deduplication relies on this.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcedureHandle {
    service: String,
    procedure: String,
}

impl ProcedureHandle {
    #[must_use]
    pub fn new(service: impl Into<String>, procedure: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            procedure: procedure.into(),
        }
    }

    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    #[must_use]
    pub fn procedure(&self) -> &str {
        &self.procedure
    }
}

impl fmt::Display for ProcedureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service, self.procedure)
    }
}

/// A failed procedure call.
///
/// The two variants draw the line the error surface needs: domain errors are
/// the procedure rejecting the call and travel to the client as a short
/// message; internal errors are bugs and carry backtrace text.
#[derive(Debug, Error)]
pub enum CallError {
    /// The procedure rejected the call (invalid target, stale handle, ...).
    #[error("{0}")]
    Domain(String),
    /// Unexpected failure inside the handler or the registry.
    #[error("{message}")]
    Internal {
        message: String,
        /// Backtrace text captured where the failure surfaced; may be empty.
        backtrace: String,
    },
}

impl CallError {
    /// Error text as sent to the client.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Domain(message) => message.clone(),
            Self::Internal { message, backtrace } if backtrace.is_empty() => message.clone(),
            Self::Internal { message, backtrace } => format!("{message}\n{backtrace}"),
        }
    }
}

/// Progress of an in-flight call.
#[derive(Debug)]
pub enum CallPoll {
    /// The call finished with a return value.
    Return(Value),
    /// Not ready yet; poll again on a later tick.
    Pending,
}

/// A resumable procedure invocation.
///
/// Owns whatever partial state the procedure captured at its last
/// suspension. Polled only by the single-threaded executor that owns it.
pub trait ProcedureCall {
    fn poll(&mut self) -> Result<CallPoll, CallError>;
}

impl<F> ProcedureCall for F
where
    F: FnMut() -> Result<CallPoll, CallError>,
{
    fn poll(&mut self) -> Result<CallPoll, CallError> {
        self()
    }
}

/// Name resolution, argument decoding, and handler dispatch.
pub trait ServiceRegistry {
    /// Resolves a `(service, procedure)` pair to an executable handle.
    ///
    /// Unknown names are a domain error.
    fn resolve(&self, service: &str, procedure: &str) -> Result<ProcedureHandle, CallError>;

    /// Decodes the opaque encoded arguments for `procedure`.
    ///
    /// Malformed or mismatched arguments are a domain error.
    fn decode_arguments(
        &self,
        procedure: &ProcedureHandle,
        arguments: &[Vec<u8>],
    ) -> Result<Vec<Value>, CallError>;

    /// Starts a call. The returned invocation is polled to completion (or
    /// abandonment on disconnect) by the engine.
    fn begin_call(&self, procedure: &ProcedureHandle, arguments: Vec<Value>)
        -> Box<dyn ProcedureCall>;
}
