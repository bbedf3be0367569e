//! # Timeout Utilities
//!
//! Optional deadlines around async operations. The protocol core mandates none,
//! so every bound is an `Option<Duration>` and `None` waits indefinitely.

use crate::error::{ProtocolError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Await `fut`, failing with [`ProtocolError::Timeout`] once `limit` elapses.
pub async fn with_timeout_error<F, T>(fut: F, limit: Option<Duration>) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(duration) => match timeout(duration, fut).await {
            Ok(result) => result,
            Err(_) => Err(ProtocolError::Timeout),
        },
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, ProtocolError>(1)
        };
        let result = with_timeout_error(slow, Some(Duration::from_millis(50))).await;
        assert!(matches!(result, Err(ProtocolError::Timeout)));
    }

    #[tokio::test]
    async fn test_no_deadline() {
        let value = with_timeout_error(async { Ok::<_, ProtocolError>(7) }, None)
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
