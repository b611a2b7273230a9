use std::{
    fmt, io, mem,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

use crate::conn::ConnectionLease;

/// A response body read incrementally from the connection.
pub type BodyStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync>>;

/// Response body.
#[derive(Default)]
pub enum Entity {
    /// No body.
    #[default]
    Empty,
    /// Body already read in full.
    Buffered(Bytes),
    /// Body still on the wire.
    Streaming(BodyStream),
    /// Streaming body that releases its connection when done.
    Managed(ManagedEntity),
}

impl Entity {
    pub fn streaming<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Sync + 'static,
    {
        Entity::Streaming(Box::pin(stream))
    }

    /// Whether reading this body still needs the connection.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Entity::Streaming(_) | Entity::Managed(_))
    }

    /// Read and drop whatever is left of the body.
    pub async fn consume(&mut self) -> io::Result<()> {
        match mem::take(self) {
            Entity::Managed(managed) => managed.close().await,
            mut other => {
                while let Some(chunk) = other.next().await {
                    chunk?;
                }
                Ok(())
            }
        }
    }

    /// Read the whole body into memory.
    pub async fn collect(mut self) -> io::Result<Bytes> {
        if let Entity::Buffered(bytes) = self {
            return Ok(bytes);
        }

        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl Stream for Entity {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this {
            Entity::Empty => Poll::Ready(None),
            Entity::Buffered(_) => match mem::take(this) {
                Entity::Buffered(bytes) if !bytes.is_empty() => Poll::Ready(Some(Ok(bytes))),
                _ => Poll::Ready(None),
            },
            Entity::Streaming(stream) => stream.as_mut().poll_next(cx),
            Entity::Managed(managed) => managed.poll_next_unpin(cx),
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Empty => f.write_str("Empty"),
            Entity::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            Entity::Streaming(_) => f.write_str("Streaming"),
            Entity::Managed(managed) => managed.fmt(f),
        }
    }
}

impl From<Bytes> for Entity {
    fn from(b: Bytes) -> Self {
        if b.is_empty() {
            Entity::Empty
        } else {
            Entity::Buffered(b)
        }
    }
}

impl From<&str> for Entity {
    fn from(s: &str) -> Self {
        Entity::from(Bytes::copy_from_slice(s.as_bytes()))
    }
}

/// A streaming body holding the lease on the connection it is read from.
///
/// End of stream releases the connection, reusable iff the keep-alive
/// decision captured at construction allows it. A read error aborts it.
/// Dropping the entity before the end aborts it as well.
pub struct ManagedEntity {
    inner: BodyStream,
    lease: Option<ConnectionLease>,
    reuse: bool,
}

impl ManagedEntity {
    pub fn new(inner: BodyStream, lease: ConnectionLease, reuse: bool) -> Self {
        Self {
            inner,
            lease: Some(lease),
            reuse,
        }
    }

    /// Whether the connection has been handed back already.
    pub fn is_released(&self) -> bool {
        self.lease.is_none()
    }

    /// Finish with the body. When the connection may be reused the rest of
    /// the body is drained first, otherwise the connection is released
    /// right away as not reusable.
    pub async fn close(mut self) -> io::Result<()> {
        if self.lease.is_none() {
            return Ok(());
        }

        if self.reuse {
            while let Some(chunk) = self.next().await {
                chunk?;
            }
        } else if let Some(lease) = self.lease.take() {
            lease.release(false);
        }
        Ok(())
    }

    /// Give up on the body and shut the connection down.
    pub fn abort_connection(mut self) {
        if let Some(lease) = self.lease.take() {
            lease.abort();
        }
    }

    fn eof_detected(&mut self) {
        if let Some(lease) = self.lease.take() {
            lease.release(self.reuse);
        }
    }

    fn stream_aborted(&mut self) {
        if let Some(lease) = self.lease.take() {
            lease.abort();
        }
    }
}

impl Stream for ManagedEntity {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.lease.is_none() {
            return Poll::Ready(None);
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(None) => {
                this.eof_detected();
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                this.stream_aborted();
                Poll::Ready(Some(Err(e)))
            }
            other => other,
        }
    }
}

impl fmt::Debug for ManagedEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedEntity")
            .field("released", &self.is_released())
            .field("reuse", &self.reuse)
            .finish()
    }
}
