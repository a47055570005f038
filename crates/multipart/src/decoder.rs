//! Async multipart decoder.
//!
//! The decoder keeps a small window of the request body in memory. Body
//! bytes are released to the caller as soon as they cannot be the start of
//! a delimiter, so memory use is bounded by the read chunk plus the
//! delimiter length regardless of part size.

use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::io::poll_read_buf;
use tracing::trace;

use crate::error::CodecError;
use crate::headers::PartHeaders;
use crate::{HEADER_BLOCK_MAX, READ_CHUNK};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before the first delimiter.
    AwaitPreamble,
    /// A delimiter was consumed; its line tail decides what follows.
    AfterDelimiter,
    AwaitHeaders,
    ConsumingBody,
    Done,
}

/// Pull-based reader over the parts of a multipart body.
#[derive(Debug)]
pub struct MultipartDecoder<R> {
    reader: R,
    buf: BytesMut,
    /// `\r\n--` followed by the boundary.
    delimiter: Vec<u8>,
    state: State,
    eof: bool,
    parts: usize,
}

impl<R: AsyncRead + Unpin> MultipartDecoder<R> {
    pub fn new(reader: R, boundary: &str) -> Self {
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        // Lets a delimiter on the very first line match like any other.
        buf.extend_from_slice(b"\r\n");
        Self {
            reader,
            buf,
            delimiter: format!("\r\n--{boundary}").into_bytes(),
            state: State::AwaitPreamble,
            eof: false,
            parts: 0,
        }
    }

    /// Number of parts returned by [`next_part`](Self::next_part) so far.
    pub fn parts_seen(&self) -> usize {
        self.parts
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Advances to the next part and returns its headers.
    ///
    /// Any unread bytes of the previous part are skipped. Returns `None`
    /// after the closing delimiter.
    pub async fn next_part(&mut self) -> Result<Option<PartHeaders>, CodecError> {
        loop {
            match self.state {
                State::AwaitPreamble => self.skip_preamble().await?,
                State::ConsumingBody => self.drain_body().await?,
                State::AfterDelimiter => self.read_delimiter_tail().await?,
                State::AwaitHeaders => {
                    let headers = self.read_headers().await?;
                    self.parts += 1;
                    self.state = State::ConsumingBody;
                    trace!(part = self.parts, name = ?headers.field_name(), "multipart part started");
                    return Ok(Some(headers));
                }
                State::Done => return Ok(None),
            }
        }
    }

    /// Reader over the current part's body. Yields EOF at the next delimiter.
    pub fn body(&mut self) -> PartBody<'_, R> {
        PartBody { decoder: self }
    }

    async fn skip_preamble(&mut self) -> Result<(), CodecError> {
        loop {
            if let Some(pos) = find(&self.buf, &self.delimiter) {
                self.buf.advance(pos + self.delimiter.len());
                self.state = State::AfterDelimiter;
                return Ok(());
            }
            let keep = self.delimiter.len() - 1;
            if self.buf.len() > keep {
                let discard = self.buf.len() - keep;
                self.buf.advance(discard);
            }
            if self.eof {
                return Err(CodecError::malformed(
                    "no multipart boundary found in request body",
                ));
            }
            self.fill().await?;
        }
    }

    async fn read_delimiter_tail(&mut self) -> Result<(), CodecError> {
        loop {
            if self.buf.starts_with(b"--") {
                self.buf.advance(2);
                if self.parts == 0 {
                    return Err(CodecError::malformed("multipart body contains no parts"));
                }
                self.state = State::Done;
                return Ok(());
            }
            if let Some(pos) = find(&self.buf, b"\r\n") {
                // Transport padding is allowed between the boundary and CRLF.
                if !self.buf[..pos].iter().all(|b| *b == b' ' || *b == b'\t') {
                    return Err(CodecError::malformed(
                        "unexpected characters after multipart boundary",
                    ));
                }
                self.buf.advance(pos + 2);
                self.state = State::AwaitHeaders;
                return Ok(());
            }
            if self.buf.len() > HEADER_BLOCK_MAX {
                return Err(CodecError::malformed("multipart boundary line too long"));
            }
            if self.eof {
                return Err(CodecError::malformed(
                    "multipart stream ended inside a boundary line",
                ));
            }
            self.fill().await?;
        }
    }

    async fn read_headers(&mut self) -> Result<PartHeaders, CodecError> {
        loop {
            if self.buf.starts_with(b"\r\n") {
                self.buf.advance(2);
                return Ok(PartHeaders::default());
            }
            if let Some(pos) = find(&self.buf, b"\r\n\r\n") {
                if pos > HEADER_BLOCK_MAX {
                    break;
                }
                let headers = PartHeaders::parse(&self.buf[..pos])?;
                self.buf.advance(pos + 4);
                return Ok(headers);
            }
            if self.buf.len() > HEADER_BLOCK_MAX {
                break;
            }
            if self.eof {
                return Err(CodecError::malformed(
                    "multipart stream ended inside part headers",
                ));
            }
            self.fill().await?;
        }
        Err(CodecError::malformed(format!(
            "part header block exceeds {HEADER_BLOCK_MAX} bytes"
        )))
    }

    async fn drain_body(&mut self) -> Result<(), CodecError> {
        loop {
            let n = poll_fn(|cx| self.poll_body_chunk(cx)).await?;
            if n == 0 {
                return Ok(());
            }
            self.buf.advance(n);
        }
    }

    /// Length of body bytes at the front of the buffer that are safe to
    /// release. Zero means the current part has ended.
    fn poll_body_chunk(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<usize>> {
        loop {
            if self.state != State::ConsumingBody {
                return Poll::Ready(Ok(0));
            }
            match find(&self.buf, &self.delimiter) {
                Some(0) => {
                    self.buf.advance(self.delimiter.len());
                    self.state = State::AfterDelimiter;
                    return Poll::Ready(Ok(0));
                }
                Some(pos) => return Poll::Ready(Ok(pos)),
                None => {
                    // The last delimiter.len() - 1 bytes might open a delimiter.
                    let safe = self.buf.len().saturating_sub(self.delimiter.len() - 1);
                    if safe > 0 {
                        return Poll::Ready(Ok(safe));
                    }
                }
            }
            if self.eof {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "multipart stream ended inside a part body",
                )));
            }
            ready!(self.poll_fill(cx))?;
        }
    }

    fn poll_read_body(&mut self, cx: &mut Context<'_>, out: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        if out.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        let available = ready!(self.poll_body_chunk(cx))?;
        let n = available.min(out.remaining());
        out.put_slice(&self.buf[..n]);
        self.buf.advance(n);
        Poll::Ready(Ok(()))
    }

    fn poll_fill(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<usize>> {
        self.buf.reserve(READ_CHUNK);
        let n = ready!(poll_read_buf(Pin::new(&mut self.reader), cx, &mut self.buf))?;
        if n == 0 {
            self.eof = true;
        }
        Poll::Ready(Ok(n))
    }

    async fn fill(&mut self) -> io::Result<usize> {
        poll_fn(|cx| self.poll_fill(cx)).await
    }
}

/// Body of the part most recently returned by
/// [`MultipartDecoder::next_part`].
#[derive(Debug)]
pub struct PartBody<'a, R> {
    decoder: &'a mut MultipartDecoder<R>,
}

impl<R: AsyncRead + Unpin> AsyncRead for PartBody<'_, R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.get_mut().decoder.poll_read_body(cx, buf)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    let last_start = haystack.len() - needle.len();
    let mut from = 0;
    while from <= last_start {
        let pos = from + haystack[from..=last_start].iter().position(|&b| b == needle[0])?;
        if &haystack[pos..pos + needle.len()] == needle {
            return Some(pos);
        }
        from = pos + 1;
    }
    None
}
