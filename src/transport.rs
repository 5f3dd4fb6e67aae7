// SPDX-License-Identifier: MPL-2.0

//! Transport abstraction.
//!
//! The engine only ever sees bytes; this trait is the seam where callers
//! plug in whatever carries them. A plain TCP implementation is provided,
//! which is all the protocol itself requires.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// A bidirectional byte stream to the broker.
///
/// Implementations must deliver bytes reliably and in order once connected;
/// everything above this trait assumes TCP-like semantics.
#[async_trait]
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {
    /// Open a stream to `addr` (`host:port`).
    async fn connect(addr: &str) -> Result<Self, TransportError>
    where
        Self: Sized;

    /// Gracefully close the connection.
    async fn close(&mut self) -> Result<(), TransportError>;

    fn peer_addr(&self) -> Result<String, TransportError>;
}

/// TCP transport, a thin wrapper around [`TcpStream`].
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub fn set_nodelay(&self, nodelay: bool) -> Result<(), TransportError> {
        self.stream.set_nodelay(nodelay).map_err(TransportError::Io)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(addr: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", addr, e)))?;
        Ok(Self { stream })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        use tokio::io::AsyncWriteExt;
        self.stream.shutdown().await.map_err(TransportError::Io)
    }

    fn peer_addr(&self) -> Result<String, TransportError> {
        self.stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .map_err(TransportError::Io)
    }
}

impl AsyncRead for TcpTransport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        ctx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(ctx, buf)
    }
}

impl AsyncWrite for TcpTransport {
    fn poll_write(
        mut self: Pin<&mut Self>,
        ctx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(ctx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(ctx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tcp_transport_connection_refused() {
        // Port 1 on localhost is almost certainly not listening.
        let result = TcpTransport::connect("127.0.0.1:1").await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_tcp_transport_roundtrip_through_listener() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let mut transport = TcpTransport::connect(&addr.to_string()).await.unwrap();
        assert!(transport.peer_addr().is_ok());

        transport.write_all(b"ping").await.unwrap();
        let mut echo = [0u8; 4];
        transport.read_exact(&mut echo).await.unwrap();
        assert_eq!(&echo, b"ping");

        transport.close().await.unwrap();
        server.await.unwrap();
    }
}
