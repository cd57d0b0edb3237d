//! Stream accessor traits for the transport layer

use crate::error::{DlmsError, DlmsResult};
use async_trait::async_trait;
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read side of a physical stream from a pushing meter
///
/// Push acquisition never writes to the meter, so only the receive
/// direction is modelled.
#[async_trait]
pub trait StreamAccessor: Send {
    /// Read data from the stream
    ///
    /// # Returns
    ///
    /// Number of bytes read, or 0 if the stream reached EOF
    async fn read(&mut self, buf: &mut [u8]) -> DlmsResult<usize>;

    /// Check if the stream is closed
    fn is_closed(&self) -> bool;

    /// Close the stream and release the underlying handle
    async fn close(&mut self) -> DlmsResult<()>;
}

#[async_trait]
impl<T> StreamAccessor for Box<T>
where
    T: StreamAccessor + ?Sized,
{
    async fn read(&mut self, buf: &mut [u8]) -> DlmsResult<usize> {
        (**self).read(buf).await
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    async fn close(&mut self) -> DlmsResult<()> {
        (**self).close().await
    }
}

/// Transport layer trait that extends StreamAccessor
#[async_trait]
pub trait TransportLayer: StreamAccessor {
    /// Open the physical layer connection
    async fn open(&mut self) -> DlmsResult<()>;
}

/// Factory for freshly opened streams, one per connection attempt
#[async_trait]
pub trait LinkConnector: Send + Sync {
    /// Open a new stream
    async fn connect(&self) -> DlmsResult<Box<dyn StreamAccessor>>;

    /// Human-readable link description for logs
    fn describe(&self) -> String;

    /// Whether end-of-stream is final rather than a lost connection
    fn ends_at_eof(&self) -> bool {
        false
    }
}

/// Adapter exposing any `AsyncRead` as a [`StreamAccessor`]
pub struct IoStream<R> {
    inner: Option<R>,
}

impl<R> IoStream<R> {
    pub fn new(inner: R) -> Self {
        Self { inner: Some(inner) }
    }
}

impl<R> fmt::Debug for IoStream<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoStream")
            .field("closed", &self.inner.is_none())
            .finish()
    }
}

#[async_trait]
impl<R> StreamAccessor for IoStream<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read(&mut self, buf: &mut [u8]) -> DlmsResult<usize> {
        let inner = self.inner.as_mut().ok_or_else(|| {
            DlmsError::Connection(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "Stream already closed",
            ))
        })?;
        match inner.read(buf).await {
            Ok(0) => {
                self.inner = None;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                self.inner = None;
                Err(DlmsError::Connection(e))
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    async fn close(&mut self) -> DlmsResult<()> {
        self.inner = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_io_stream_reads_then_closes_on_eof() {
        let mock = tokio_test::io::Builder::new().read(&[0x7E, 0xA0]).build();
        let mut stream = IoStream::new(mock);
        let mut buf = [0u8; 16];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 2);
        assert_eq!(&buf[..2], &[0x7E, 0xA0]);
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
        assert!(stream.is_closed());
    }

    #[tokio::test]
    async fn test_io_stream_maps_read_error() {
        let mock = tokio_test::io::Builder::new()
            .read_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"))
            .build();
        let mut stream = IoStream::new(mock);
        let mut buf = [0u8; 4];
        assert!(matches!(
            stream.read(&mut buf).await,
            Err(DlmsError::Connection(_))
        ));
        assert!(stream.is_closed());
        assert!(stream.read(&mut buf).await.is_err());
    }
}
