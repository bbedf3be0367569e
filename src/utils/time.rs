//! Timestamp helpers for packet nonces.

use crate::error::{ProtocolError, Result};
use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Upper bound (exclusive) of the jitter added to each nonce
pub const NONCE_JITTER_MS: i64 = 1000;

/// Milliseconds since the Unix epoch
pub fn current_timestamp_ms() -> Result<i64> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| ProtocolError::Validation(format!("system clock before Unix epoch: {e}")))?;
    Ok(elapsed.as_millis() as i64)
}

/// Packet nonce: current time in milliseconds plus random jitter in `0..1000`.
///
/// The receiver does not enforce uniqueness; the jitter only makes collisions
/// between packets built in the same millisecond unlikely.
pub fn packet_nonce() -> Result<i64> {
    let jitter = rand::rng().random_range(0..NONCE_JITTER_MS);
    Ok(current_timestamp_ms()? + jitter)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_nonce_is_close_to_now() {
        let before = current_timestamp_ms().unwrap();
        let nonce = packet_nonce().unwrap();
        let after = current_timestamp_ms().unwrap();
        assert!(nonce >= before);
        assert!(nonce < after + NONCE_JITTER_MS);
    }
}
