//! Byte channels and the connectors that open them.
//!
//! The secure-channel handshake lives below this seam: a [`Connector`]
//! hands back an already-established byte stream, and everything above only
//! sees [`AsyncRead`] + [`AsyncWrite`]. [`TcpConnector`] is the plain TCP
//! implementation; a TLS connector wraps the stream before returning it.
//!
//! # Example
//!
//! ```ignore
//! use linkwire_client::transport::{Connector, TcpConnector};
//! use std::time::Duration;
//!
//! let channel = TcpConnector::new()
//!     .open("127.0.0.1", 7400, Duration::from_secs(10))
//!     .await?;
//! ```

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// An established, ordered byte stream.
pub trait Channel: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Channel for T {}

/// Owned channel as handed out by a connector.
pub type BoxedChannel = Box<dyn Channel>;

/// Opens channels to a server.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a channel to `host:port`, giving up after `timeout`.
    ///
    /// Any handshake the channel needs must be complete when this returns.
    async fn open(&self, host: &str, port: u16, timeout: Duration) -> io::Result<BoxedChannel>;
}

/// Plain TCP connector.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    nodelay: bool,
}

impl TcpConnector {
    /// Create a connector with `TCP_NODELAY` enabled.
    pub fn new() -> Self {
        Self { nodelay: true }
    }

    /// Toggle `TCP_NODELAY` on opened sockets.
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn open(&self, host: &str, port: u16, timeout: Duration) -> io::Result<BoxedChannel> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {}:{} timed out after {:?}", host, port, timeout),
                )
            })??;

        stream.set_nodelay(self.nodelay)?;
        Ok(Box::new(stream))
    }
}
