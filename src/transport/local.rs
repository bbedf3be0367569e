//! Local IPC connector.
//!
//! On Unix systems this uses Unix Domain Sockets. Other platforms have no
//! local transport and report a connection error.

use crate::error::Result;
use crate::transport::Stream;
use std::path::Path;
use tracing::instrument;

#[cfg(unix)]
#[instrument(skip(path), fields(socket_path = %path.display()), level = "debug")]
pub async fn connect(path: &Path) -> Result<Box<dyn Stream>> {
    let stream = tokio::net::UnixStream::connect(path).await?;
    Ok(Box::new(stream))
}

#[cfg(not(unix))]
#[instrument(skip(path), fields(socket_path = %path.display()), level = "debug")]
pub async fn connect(path: &Path) -> Result<Box<dyn Stream>> {
    Err(crate::error::ProtocolError::Connection(format!(
        "local socket {} is not supported on this platform",
        path.display()
    )))
}
