//! Decoded argument and return values.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failed to convert between a [`Value`] and its encoded form.
#[derive(Debug, Error)]
pub enum ValueError {
    /// The encoded bytes did not describe a value.
    #[error("value decoding failed: {0}")]
    Decode(postcard::Error),
    /// The value could not be encoded.
    #[error("value encoding failed: {0}")]
    Encode(postcard::Error),
}

/// A decoded argument or return value.
///
/// Stream deduplication and result diffing compare decoded values, so two
/// different encodings of the same value are equal here. `Float` uses the
/// derived comparison: a NaN result compares unequal to itself and is
/// re-sent every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Tuple(Vec<Value>),
}

impl Value {
    /// Decodes a value from its compact encoded form.
    pub fn decode(bytes: &[u8]) -> Result<Self, ValueError> {
        postcard::from_bytes(bytes).map_err(ValueError::Decode)
    }

    /// Encodes the value into its compact form.
    pub fn encode(&self) -> Result<Vec<u8>, ValueError> {
        postcard::to_allocvec(self).map_err(ValueError::Encode)
    }
}
