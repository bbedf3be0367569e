//! # bot-socket-client
//!
//! Client side of the bot's remote-command socket protocol.
//!
//! A client opens a short-lived session, sends one or more fixed-layout
//! commands encrypted with AES-256-GCM and authenticated with HMAC-SHA256, and
//! closes the session again. Each command gets exactly one framed response.
//!
//! ## Layers
//! - [`core`]: header layouts, packet sealing/opening, payload encodings
//! - [`protocol`]: per-command schemas and the session exchange
//! - [`transport`]: TCP / Unix socket connections with exact-size reads
//! - [`service`]: the [`Sender`] engine and its operations
//! - [`utils`]: crypto primitives, logging, metrics, timeouts
//!
//! ## Example
//! ```no_run
//! use bot_socket_client::{ClientConfig, Sender};
//!
//! # async fn run() -> bot_socket_client::Result<()> {
//! let mut sender = Sender::new(ClientConfig::default())?;
//! sender.send_message(-1001234567890, "deploy finished").await?;
//! let uptime = sender.get_uptime().await?;
//! println!("bot up for {}", uptime.uptime);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use config::{ClientConfig, LoggingConfig, SocketConfig};
pub use core::header::{Command, PayloadType, WireLayout};
pub use error::{ErrorKind, ProtocolError, Result};
pub use protocol::schema::{FileType, SpamBlockMode};
pub use service::{Sender, SessionState, UploadOptions};
pub use transport::Endpoint;
