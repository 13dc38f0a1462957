//! Request, response, and stream message shapes.

use serde::{Deserialize, Serialize};

use super::types::StreamId;

/// An addressed procedure call, immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Target service name.
    pub service: String,
    /// Target procedure name within the service.
    pub procedure: String,
    /// Positional arguments as opaque encoded values.
    pub arguments: Vec<Vec<u8>>,
}

impl Request {
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        procedure: impl Into<String>,
        arguments: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            service: service.into(),
            procedure: procedure.into(),
            arguments,
        }
    }
}

/// Either a return value or an error message. Exactly one of the two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponseBody {
    /// Successful return value, opaque encoded.
    Return(Vec<u8>),
    /// Human-readable error; unexpected failures append backtrace text.
    Error(String),
}

/// Result of one procedure call.
///
/// `time` is the host's universal time, stamped immediately before the
/// response frame is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub time: f64,
    pub body: ResponseBody,
}

impl Response {
    /// A successful response. The timestamp is filled in at send time.
    #[must_use]
    pub fn returning(value: Vec<u8>) -> Self {
        Self {
            time: 0.0,
            body: ResponseBody::Return(value),
        }
    }

    /// An error response. The timestamp is filled in at send time.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            time: 0.0,
            body: ResponseBody::Error(message.into()),
        }
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        matches!(self.body, ResponseBody::Error(_))
    }
}

/// One stream update, addressed by subscription id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamResponse {
    pub id: StreamId,
    pub response: Response,
}

/// Batched stream updates for one stream client.
///
/// Written at most once per tick; only subscriptions whose value changed
/// appear, in the order the subscriptions were created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage {
    pub responses: Vec<StreamResponse>,
}

impl StreamMessage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}
