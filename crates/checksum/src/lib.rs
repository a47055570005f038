//! Streaming CRC32 verification.
//!
//! [`Checked`] wraps a reader or writer and feeds every byte that crosses it,
//! in order, into a CRC32 accumulator. The sender wraps its payload source,
//! the receiver wraps each decoded body, and the two final values must match.

use std::io::{self, Read, Write};
use std::pin::Pin;
use std::task::{Context, Poll};

use crc32fast::Hasher;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// CRC32 of an in-memory buffer.
pub fn checksum_bytes(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// A reader or writer that checksums the bytes passing through it.
#[derive(Debug)]
pub struct Checked<S> {
    inner: S,
    hasher: Hasher,
    bytes: u64,
}

impl<S> Checked<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
            bytes: 0,
        }
    }

    /// CRC32 of every byte seen so far (`0` before any byte).
    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Number of bytes seen so far.
    pub fn byte_count(&self) -> u64 {
        self.bytes
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn observe(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes += data.len() as u64;
    }
}

impl<R: Read> Read for Checked<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.observe(&buf[..n]);
        Ok(n)
    }
}

impl<W: Write> Write for Checked<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.observe(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for Checked<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let start = buf.filled().len();
        let result = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = result {
            let filled = buf.filled();
            this.hasher.update(&filled[start..]);
            this.bytes += (filled.len() - start) as u64;
        }
        result
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for Checked<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let result = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = result {
            this.observe(&buf[..n]);
        }
        result
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
