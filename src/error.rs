//! # Error Types
//!
//! Error handling for the bot socket client.
//!
//! Every failure at framing, crypto or transport level aborts the current call
//! and comes back to the caller as a [`ProtocolError`]. Nothing is retried, and
//! nothing from a packet that failed a verification step is handed upward.
//!
//! ## Error Categories
//! - **Connection**: connect/send/receive failures, premature peer closure, timeouts
//! - **MalformedHeader**: bad magic, truncated or oversized header
//! - **Integrity**: HMAC digest mismatch
//! - **Authentication**: AES-GCM tag rejected
//! - **Protocol**: unexpected response command, invalid enum value, server rejection
//! - **Validation**: caller-supplied data violates a field constraint
//!
//! ## Example Usage
//! ```rust
//! use bot_socket_client::error::{ErrorKind, ProtocolError, Result};
//!
//! fn parse_chat(raw: &str) -> Result<i64> {
//!     raw.trim()
//!         .parse::<i64>()
//!         .map_err(|e| ProtocolError::Validation(format!("chat id '{raw}': {e}")))
//! }
//!
//! let err = parse_chat("not-a-number").unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::Validation);
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Framing errors
    pub const ERR_TRUNCATED_HEADER: &str = "Buffer shorter than the declared header size";
    pub const ERR_BAD_MAGIC: &str = "Magic value does not match this protocol version";
    pub const ERR_HEADER_SIZE_DRIFT: &str = "Serialized header length disagrees with layout";
    pub const ERR_TRUNCATED_BODY: &str = "Buffer shorter than the declared payload";

    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Socket closed before receiving all data";
    pub const ERR_NOT_CONNECTED: &str = "No transport connection";
    pub const ERR_TIMEOUT: &str = "Operation timed out";

    /// Cryptographic errors
    pub const ERR_TAG_MISMATCH: &str = "AES-GCM authentication tag mismatch";
    pub const ERR_CIPHERTEXT_TOO_SHORT: &str = "Encrypted payload too short to hold a tag";
    pub const ERR_HMAC_MISMATCH: &str = "HMAC mismatch";
    pub const ERR_UNEXPECTED_DIGEST: &str = "Non-zero digest on a packet without session token";
    pub const ERR_RANDOM_SOURCE: &str = "OS random source unavailable";
    pub const ERR_FOREIGN_TOKEN: &str = "Response carries a different session token";
    pub const ERR_UNSIGNED_RESPONSE: &str = "Response inside a session carries no session token";
    pub const ERR_FILE_HASH_MISMATCH: &str = "Received file does not match its SHA-256";

    /// Session errors
    pub const ERR_NO_SESSION: &str = "No open session";
    pub const ERR_BAD_TOKEN_LENGTH: &str = "Session token must be exactly 32 bytes";
    pub const ERR_SESSION_EXISTS: &str = "A session is already open";
    pub const ERR_TOKEN_MISMATCH: &str = "Header token disagrees with acknowledged token";
}

/// Broad failure category, one per row of the error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    MalformedHeader,
    Integrity,
    Authentication,
    Protocol,
    Validation,
    Config,
}

// ProtocolError is the primary error type for all client operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Malformed header: {0}")]
    MalformedHeader(&'static str),

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Integrity check failed: {0}")]
    Integrity(&'static str),

    #[error("Authentication failed: {0}")]
    Authentication(&'static str),

    #[error("Unexpected response command: expected {expected}, got {actual}")]
    UnexpectedCommand { expected: String, actual: String },

    #[error("Invalid {field} value on the wire: {value}")]
    InvalidEnum { field: &'static str, value: i64 },

    #[error("Server rejected the command ({ack}): {message}")]
    Rejected { ack: String, message: String },

    #[error("Malformed response body: {0}")]
    MalformedBody(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Session error: {0}")]
    Session(&'static str),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    /// Classify this error into the taxonomy callers match on.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::Io(_)
            | ProtocolError::ConnectionClosed
            | ProtocolError::Connection(_)
            | ProtocolError::Timeout => ErrorKind::Connection,
            ProtocolError::MalformedHeader(_) | ProtocolError::OversizedPacket(_) => {
                ErrorKind::MalformedHeader
            }
            ProtocolError::Integrity(_) => ErrorKind::Integrity,
            ProtocolError::Authentication(_) => ErrorKind::Authentication,
            ProtocolError::UnexpectedCommand { .. }
            | ProtocolError::InvalidEnum { .. }
            | ProtocolError::Rejected { .. }
            | ProtocolError::MalformedBody(_)
            | ProtocolError::Json(_)
            | ProtocolError::Session(_) => ErrorKind::Protocol,
            ProtocolError::Validation(_) => ErrorKind::Validation,
            ProtocolError::ConfigError(_) => ErrorKind::Config,
        }
    }

    /// Whether the underlying transport is unusable after this error.
    pub fn is_fatal_to_connection(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
