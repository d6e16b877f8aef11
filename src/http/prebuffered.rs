//! Buffered reader shared by the head parser and the body decoders.
//!
//! A connection's input is parsed in place: heads are peeked out of the
//! buffer, bodies are carved off its front, and whatever follows (a pipelined
//! request, trailing bytes of an upgraded stream) stays put for the next
//! consumer.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use tokio::io::{self, AsyncRead, AsyncReadExt, ReadBuf};

/// Initial capacity for the internal buffer.
const INITIAL_CAPACITY: usize = 8 * 1024;

/// A prebuffering wrapper around an `AsyncRead`.
pub struct Prebuffered<R> {
    inner: R,
    buf: BytesMut,
    max_len: usize,
    eof: bool,
}

impl<R: AsyncRead + Unpin> Prebuffered<R> {
    /// Creates a new wrapper holding at most `max_len` unconsumed bytes.
    pub fn new(inner: R, max_len: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_CAPACITY.min(max_len)),
            max_len,
            eof: false,
        }
    }

    /// Returns the unconsumed buffered bytes.
    pub fn buffer(&self) -> &[u8] {
        &self.buf[..]
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.max_len
    }

    /// True once the inner reader has reported end of stream.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Discards `n` bytes from the front of the buffer.
    pub fn discard(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        let _ = self.buf.split_to(n);
    }

    /// Removes up to `n` bytes from the front of the buffer.
    pub fn split_front(&mut self, n: usize) -> Bytes {
        let n = n.min(self.buf.len());
        self.buf.split_to(n).freeze()
    }

    /// Buffers more data from the inner reader.
    ///
    /// Returns `0` at end of stream or when the buffer is already full.
    pub async fn buffer_more(&mut self) -> io::Result<usize> {
        let max = self.max_len.saturating_sub(self.buf.len());
        if max == 0 {
            return Ok(0);
        }
        let n = (&mut self.inner)
            .take(max as u64)
            .read_buf(&mut self.buf)
            .await?;
        if n == 0 {
            self.eof = true;
        }
        Ok(n)
    }

    /// Makes sure at least one byte is buffered.
    ///
    /// Fails with [`io::ErrorKind::UnexpectedEof`] if the stream ends first.
    pub async fn fill(&mut self) -> io::Result<()> {
        if self.buf.is_empty() && self.buffer_more().await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed in the middle of a message",
            ));
        }
        Ok(())
    }

    /// Returns the buffer and the inner reader.
    pub fn into_parts(self) -> (Bytes, R) {
        (self.buf.freeze(), self.inner)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for Prebuffered<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        out: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if out.remaining() == 0 {
            Poll::Ready(Ok(()))
        } else if !self.buf.is_empty() {
            let n = self.buf.len().min(out.remaining());
            let chunk = self.buf.split_to(n);
            out.put_slice(&chunk);
            Poll::Ready(Ok(()))
        } else {
            Pin::new(&mut self.inner).poll_read(cx, out)
        }
    }
}
