//! # Payload Encodings
//!
//! Every packet carries a payload-type tag in its header, negotiated per
//! packet and independent of the command id. This module owns that tag and the
//! traits that let a message schema produce, or be rebuilt from, either
//! encoding.
//!
//! - **Binary**: fixed-width little-endian record, size known at compile time
//! - **JSON**: UTF-8 object, used by "text mode" requests and by several
//!   server responses
//!
//! Decoding always dispatches on the tag the peer declared; the bytes are never
//! inspected to guess which encoding was used.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload-type tag carried in every header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadType {
    /// Fixed-layout record (default)
    #[default]
    Binary,
    /// UTF-8 JSON object
    Json,
}

impl PayloadType {
    /// Value written into the header
    pub fn wire_value(self) -> u32 {
        match self {
            PayloadType::Binary => 0,
            PayloadType::Json => 1,
        }
    }

    /// Parse the header value; anything else is a protocol violation
    pub fn from_wire(value: u32) -> Result<Self> {
        match value {
            0 => Ok(PayloadType::Binary),
            1 => Ok(PayloadType::Json),
            other => Err(ProtocolError::InvalidEnum {
                field: "payload_type",
                value: other as i64,
            }),
        }
    }

    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            PayloadType::Binary => "BINARY",
            PayloadType::Json => "JSON",
        }
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Request payloads that can be sent in either encoding
pub trait WirePayload {
    /// Fixed-width record bytes
    fn to_binary(&self) -> Vec<u8>;

    /// JSON object bytes
    fn to_json(&self) -> Result<Vec<u8>>;

    /// Encode according to the chosen tag
    fn encode(&self, payload_type: PayloadType) -> Result<Vec<u8>> {
        match payload_type {
            PayloadType::Binary => Ok(self.to_binary()),
            PayloadType::Json => self.to_json(),
        }
    }
}

/// Response payloads that may arrive in either encoding
pub trait FromWirePayload: Sized {
    /// Rebuild from a fixed-width record
    fn from_binary(data: &[u8]) -> Result<Self>;

    /// Rebuild from a JSON object
    fn from_json(data: &[u8]) -> Result<Self>;

    /// Decode by the tag declared in the response header
    fn decode(payload_type: PayloadType, data: &[u8]) -> Result<Self> {
        match payload_type {
            PayloadType::Binary => Self::from_binary(data),
            PayloadType::Json => Self::from_json(data),
        }
    }
}
