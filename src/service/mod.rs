//! # Service Layer
//!
//! The client engine and the operations built on it.
//!
//! ## Components
//! - **Sender**: session lifecycle, `invoke`, chat and control commands
//! - **File transfer**: two-phase upload and download

pub mod file_transfer;
pub mod sender;

pub use file_transfer::UploadOptions;
pub use sender::{Request, Response, Sender, SessionState};
