//! TCP connector.

use crate::error::Result;
use tokio::net::TcpStream;
use tracing::debug;

/// Open a TCP stream with Nagle disabled; packets are written whole.
pub async fn connect(host: &str, port: u16) -> Result<TcpStream> {
    let stream = TcpStream::connect((host, port)).await?;
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "Could not disable Nagle's algorithm");
    }
    Ok(stream)
}
