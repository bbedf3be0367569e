//! # Transport Layer
//!
//! Byte-stream connections to the bot's socket service.
//!
//! ## Endpoints
//! - **TCP**: `host:port`, the usual deployment
//! - **Local**: Unix domain socket path (unix platforms only)
//!
//! The protocol frames itself with fixed-size headers, so the transport only
//! has to move bytes: [`Connection::send_all`] writes a whole packet and
//! [`Connection::recv_exact`] loops until exactly the requested number of bytes
//! has arrived. A zero-byte read before that point means the peer went away.

pub mod local;
pub mod tcp;

use crate::error::{constants, ProtocolError, Result};
use crate::utils::timeout::with_timeout_error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument};

/// Where the socket service listens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Local { path: PathBuf },
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Endpoint::Tcp { host, port } => write!(f, "{host}:{port}"),
            Endpoint::Local { path } => write!(f, "unix:{}", path.display()),
        }
    }
}

impl FromStr for Endpoint {
    type Err = ProtocolError;

    /// Accepts `host:port`, `[v6]:port` or `unix:/path/to/socket`.
    fn from_str(s: &str) -> Result<Self> {
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(ProtocolError::ConfigError(
                    "unix endpoint needs a socket path".to_string(),
                ));
            }
            return Ok(Endpoint::Local {
                path: PathBuf::from(path),
            });
        }

        let (host, port) = s.rsplit_once(':').ok_or_else(|| {
            ProtocolError::ConfigError(format!("endpoint '{s}' is not host:port"))
        })?;
        let port = port
            .parse::<u16>()
            .map_err(|e| ProtocolError::ConfigError(format!("invalid port in '{s}': {e}")))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(ProtocolError::ConfigError(format!(
                "endpoint '{s}' has an empty host"
            )));
        }
        Ok(Endpoint::Tcp {
            host: host.to_string(),
            port,
        })
    }
}

/// Any bidirectional byte stream a [`Connection`] can run over
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

/// One open transport connection
pub struct Connection {
    stream: Box<dyn Stream>,
    peer: String,
}

impl Connection {
    /// Connect to `endpoint`, bounded by `limit` when given
    #[instrument(skip(endpoint, limit), fields(endpoint = %endpoint), level = "debug")]
    pub async fn connect(endpoint: &Endpoint, limit: Option<Duration>) -> Result<Self> {
        let peer = endpoint.to_string();
        let connect = async {
            let stream: Box<dyn Stream> = match endpoint {
                Endpoint::Tcp { host, port } => Box::new(tcp::connect(host, *port).await?),
                Endpoint::Local { path } => local::connect(path).await?,
            };
            Ok::<_, ProtocolError>(stream)
        };

        let stream = with_timeout_error(connect, limit).await.map_err(|e| match e {
            ProtocolError::Timeout => ProtocolError::Connection(format!(
                "timed out connecting to {peer}"
            )),
            ProtocolError::Io(io) => {
                ProtocolError::Connection(format!("failed to connect to {peer}: {io}"))
            }
            other => other,
        })?;

        debug!(peer = %peer, "Connected");
        Ok(Self { stream, peer })
    }

    /// Wrap an already-connected stream
    pub fn from_stream<S: Stream + 'static>(stream: S, peer: impl Into<String>) -> Self {
        Self {
            stream: Box::new(stream),
            peer: peer.into(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Write every byte of `data` and flush
    pub async fn send_all(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read exactly `size` bytes
    pub async fn recv_exact(&mut self, size: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; size];
        recv_exact(&mut self.stream, &mut buf).await?;
        Ok(buf)
    }

    /// Best-effort orderly shutdown of the write half
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(peer = %self.peer, error = %e, "Shutdown failed");
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("peer", &self.peer).finish()
    }
}

/// Fill `buf` completely from `reader`.
///
/// Partial reads are accumulated; a zero-byte read before `buf` is full is
/// [`ProtocolError::ConnectionClosed`].
pub async fn recv_exact<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            debug!(
                received = filled,
                expected = buf.len(),
                "{}",
                constants::ERR_CONNECTION_CLOSED
            );
            return Err(ProtocolError::ConnectionClosed);
        }
        filled += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn test_parse_tcp_endpoint() {
        let endpoint: Endpoint = "bot.local:50000".parse().unwrap();
        assert_eq!(
            endpoint,
            Endpoint::Tcp {
                host: "bot.local".to_string(),
                port: 50000
            }
        );
        assert_eq!(endpoint.to_string(), "bot.local:50000");
    }

    #[test]
    fn test_parse_ipv6_and_unix() {
        let v6: Endpoint = "[::1]:8080".parse().unwrap();
        assert_eq!(v6.to_string(), "[::1]:8080");

        let local: Endpoint = "unix:/tmp/bot.sock".parse().unwrap();
        assert_eq!(
            local,
            Endpoint::Local {
                path: PathBuf::from("/tmp/bot.sock")
            }
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["no-port", "host:99999", ":50000", "unix:"] {
            assert!(
                matches!(bad.parse::<Endpoint>(), Err(ProtocolError::ConfigError(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_recv_exact_accumulates_partial_reads() {
        let (mut client, mut server) = tokio::io::duplex(4);
        let writer = tokio::spawn(async move {
            server.write_all(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]).await.unwrap();
        });

        let mut buf = [0u8; 10];
        recv_exact(&mut client, &mut buf).await.unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_recv_exact_premature_close() {
        let (client, mut server) = tokio::io::duplex(64);
        server.write_all(&[0xAA; 10]).await.unwrap();
        drop(server);

        let mut conn = Connection::from_stream(client, "duplex");
        let result = conn.recv_exact(20).await;
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = Endpoint::Tcp {
            host: "127.0.0.1".to_string(),
            port,
        };
        let err = Connection::connect(&endpoint, Some(Duration::from_secs(2)))
            .await
            .unwrap_err();
        assert!(err.is_fatal_to_connection());
    }
}
