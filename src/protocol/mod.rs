//! # Protocol Layer
//!
//! Message schemas for every command and the session open/close exchange.
//!
//! ## Components
//! - **Schema**: fixed-width records, JSON variants and response decoding
//! - **Session**: open-session request, acknowledgement handling, close request

pub mod schema;
pub mod session;

pub use schema::{
    AckPayload, AckType, BinaryRecord, FileType, GenericAck, SpamBlockMode, TransferFile,
    TransferOptions, UptimeCallback,
};
pub use session::Session;
