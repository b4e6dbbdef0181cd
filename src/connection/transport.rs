use std::ops::DerefMut;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

/// SASL/SSL handshakes are out of scope for this client; this unit type is
/// kept as a named seam so a future transport can be slotted in without
/// reshaping [`Transport::connect`]'s signature.
#[allow(missing_copy_implementations)]
#[derive(Debug, Clone, Default)]
pub struct TlsConfig();

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("IO Error: {0}")]
    IO(#[from] std::io::Error),

    #[error("Invalid host-port string: {0}")]
    InvalidHostPort(String),

    #[error("Connecting to broker timed out")]
    ConnectTimeout,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A plain TCP connection to one broker.
#[derive(Debug)]
pub struct Transport {
    inner: TcpStream,
}

impl AsyncRead for Transport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.deref_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.deref_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.deref_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.deref_mut().inner).poll_shutdown(cx)
    }
}

impl Transport {
    pub async fn connect(
        broker: &str,
        _tls_config: TlsConfig,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let inner = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, TcpStream::connect(broker))
                .await
                .map_err(|_| Error::ConnectTimeout)??,
            None => TcpStream::connect(broker).await?,
        };
        inner.set_nodelay(true).ok();
        Ok(Self { inner })
    }

    pub fn into_split(self) -> (tokio::net::tcp::OwnedReadHalf, tokio::net::tcp::OwnedWriteHalf) {
        self.inner.into_split()
    }
}
