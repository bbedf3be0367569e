//! # Utility Modules
//!
//! Supporting utilities for cryptography, logging, timing and metrics.
//!
//! ## Components
//! - **Crypto**: AES-256-GCM, HMAC-SHA256, SHA-256 and the zeroizing session key
//! - **Logging**: `tracing` subscriber setup from configuration
//! - **Time**: millisecond nonces with jitter
//! - **Timeout**: optional async deadlines
//! - **Metrics**: per-client atomic counters
//!
//! ## Security
//! - IVs drawn from the OS random source (getrandom)
//! - Constant-time digest comparison
//! - Session keys wiped on drop (zeroize crate)

pub mod crypto;
pub mod logging;
pub mod metrics;
pub mod time;
pub mod timeout;

pub use crypto::SessionKey;
pub use metrics::{Metrics, MetricsSnapshot};
