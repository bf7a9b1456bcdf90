//! Transport seam for the session.
//!
//! The session state machine only needs three operations: receive one
//! message, send all of a buffer, and shut the connection down in both
//! directions. Abstracting them behind a trait lets tests run the full
//! session over an in-memory duplex pipe.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{LinkError, Result};

/// Byte transport carrying the session protocol.
///
/// `Send + Sync` because the session borrows itself across await points
/// inside a spawned worker task.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Read one inbound message into `buf`, returning the byte count.
    /// Zero means the peer closed its half of the connection.
    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `bytes`.
    async fn send_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Shut down the write half so the peer observes EOF. The read half
    /// closes when the transport is dropped at session teardown. Errors are
    /// ignored: teardown must succeed even on an already-broken transport.
    async fn shutdown(&mut self);
}

/// [`Transport`] over any async byte stream.
#[derive(Debug)]
pub struct IoTransport<T> {
    io: T,
}

impl<T> IoTransport<T> {
    pub fn new(io: T) -> Self {
        Self { io }
    }
}

#[async_trait]
impl<T> Transport for IoTransport<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.io.read(buf).await
    }

    async fn send_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.io.write_all(bytes).await
    }

    async fn shutdown(&mut self) {
        let _ = self.io.shutdown().await;
    }
}

/// TCP transport to the controller.
pub type TcpTransport = IoTransport<TcpStream>;

impl TcpTransport {
    /// Dial the controller endpoint, optionally bounding the attempt.
    pub async fn dial(
        endpoint: std::net::SocketAddr,
        timeout: Option<std::time::Duration>,
    ) -> Result<Self> {
        debug!(%endpoint, "dialing controller");
        let connect = TcpStream::connect(endpoint);
        let stream = match timeout {
            Some(limit) => tokio::time::timeout(limit, connect).await.map_err(|_| {
                LinkError::connect_failure(format!("dial to {endpoint} timed out after {limit:?}"))
            })?,
            None => connect.await,
        }
        .map_err(|e| {
            LinkError::connect_failure_with_source(format!("dial to {endpoint} failed"), e)
        })?;

        // Tiny control messages; don't let Nagle sit on them.
        let _ = stream.set_nodelay(true);
        Ok(IoTransport::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transports_are_send_and_sync() {
        // The worker future captures the session (and its transport) across
        // await points, so tokio::spawn needs both bounds.
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TcpTransport>();
        assert_send_sync::<IoTransport<tokio::io::DuplexStream>>();
    }

    #[tokio::test]
    async fn duplex_round_trip() {
        let (a, b) = tokio::io::duplex(64);
        let mut left = IoTransport::new(a);
        let mut right = IoTransport::new(b);

        left.send_all(&[1, 2, 3]).await.unwrap();
        let mut buf = [0u8; 8];
        let n = right.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3]);
    }

    #[tokio::test]
    async fn shutdown_yields_zero_length_read() {
        let (a, b) = tokio::io::duplex(64);
        let mut left = IoTransport::new(a);
        let mut right = IoTransport::new(b);

        left.shutdown().await;
        let mut buf = [0u8; 8];
        assert_eq!(right.recv(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dial_refused_maps_to_connect_failure() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap();
        drop(listener);

        let err = TcpTransport::dial(endpoint, None).await.unwrap_err();
        assert!(matches!(err, LinkError::ConnectFailure { .. }));
    }
}
