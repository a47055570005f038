//! Minimal HTTP/1.1 framing.
//!
//! Only what uploads need: a request head, a body framed by
//! `Content-Length` or chunked transfer encoding, and a JSON response that
//! closes the connection.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures_util::stream::try_unfold;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf, Take,
};
use tokio_util::io::StreamReader;

use upbench_protocol::constants::APPLICATION_JSON;

use crate::{MAX_HEAD_SIZE, READ_BUFFER_SIZE, ServerError};

/// Request line and headers. Header names are stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    /// Request target without the query string.
    pub path: String,
    headers: Vec<(String, String)>,
}

impl RequestHead {
    /// First value of header `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn content_length(&self) -> Result<Option<u64>, ServerError> {
        self.header("content-length")
            .map(|v| {
                v.trim().parse::<u64>().map_err(|_| {
                    ServerError::MalformedRequest(format!("invalid Content-Length: {v}"))
                })
            })
            .transpose()
    }

    pub fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .is_some_and(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("chunked")))
    }

    pub fn expects_continue(&self) -> bool {
        self.header("expect")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("100-continue"))
    }
}

/// Reads a request head. Returns `None` if the peer closed before sending
/// anything.
pub async fn read_head<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<Option<RequestHead>, ServerError> {
    let mut budget = MAX_HEAD_SIZE;

    let request_line = loop {
        match read_line(reader, &mut budget).await? {
            None => return Ok(None),
            // Tolerate stray CRLFs before the request line.
            Some(line) if line.is_empty() => continue,
            Some(line) => break line,
        }
    };

    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed(format!("invalid request line: {request_line}")));
    };
    if !version.starts_with("HTTP/1.") {
        return Err(malformed(format!("unsupported HTTP version: {version}")));
    }
    let path = target.split('?').next().unwrap_or(target).to_string();

    let mut headers = Vec::new();
    loop {
        let line = read_line(reader, &mut budget)
            .await?
            .ok_or_else(|| malformed("connection closed inside request head"))?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| malformed(format!("invalid header line: {line}")))?;
        headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
    }

    Ok(Some(RequestHead {
        method: method.to_string(),
        path,
        headers,
    }))
}

async fn read_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    budget: &mut usize,
) -> Result<Option<String>, ServerError> {
    let mut line = Vec::new();
    let n = (&mut *reader)
        .take(*budget as u64 + 1)
        .read_until(b'\n', &mut line)
        .await?;
    if n == 0 {
        return Ok(None);
    }
    if n > *budget {
        return Err(malformed(format!("request head exceeds {MAX_HEAD_SIZE} bytes")));
    }
    *budget -= n;
    if !line.ends_with(b"\n") {
        return Err(malformed("connection closed inside request head"));
    }
    line.pop();
    if line.ends_with(b"\r") {
        line.pop();
    }
    String::from_utf8(line)
        .map(Some)
        .map_err(|_| malformed("request head is not valid UTF-8"))
}

/// Body boxed as a plain async reader.
pub type BodyReader<'a> = Box<dyn AsyncRead + Unpin + Send + 'a>;

/// Returns a reader yielding exactly the request body.
pub fn body_reader<'a, R>(head: &RequestHead, reader: &'a mut R) -> Result<BodyReader<'a>, ServerError>
where
    R: AsyncBufRead + Unpin + Send,
{
    if head.is_chunked() {
        return Ok(Box::new(chunked_body(reader)));
    }
    match head.content_length()? {
        Some(len) => Ok(Box::new(FixedLength {
            inner: reader.take(len),
        })),
        None => Ok(Box::new(tokio::io::empty())),
    }
}

/// `Content-Length` body. Ending early is an `UnexpectedEof` error.
struct FixedLength<R> {
    inner: Take<R>,
}

impl<R: AsyncRead + Unpin> AsyncRead for FixedLength<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        ready!(Pin::new(&mut self.inner).poll_read(cx, buf))?;

        let outstanding = self.inner.limit();
        if buf.filled().len() == before && buf.remaining() > 0 && outstanding > 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("connection closed with {outstanding} body bytes outstanding"),
            )));
        }
        Poll::Ready(Ok(()))
    }
}

struct Chunked<'a, R> {
    reader: &'a mut R,
    /// Bytes left in the current chunk.
    remaining: u64,
}

fn chunked_body<'a, R>(reader: &'a mut R) -> impl AsyncRead + Unpin + Send + 'a
where
    R: AsyncBufRead + Unpin + Send,
{
    let state = Chunked {
        reader,
        remaining: 0,
    };
    let stream = try_unfold(state, |state| next_chunk(state));
    StreamReader::new(Box::pin(stream))
}

/// Yields the next slice of chunk data, at most one read buffer long.
async fn next_chunk<'a, R>(mut state: Chunked<'a, R>) -> io::Result<Option<(Bytes, Chunked<'a, R>)>>
where
    R: AsyncBufRead + Unpin + Send,
{
    if state.remaining == 0 {
        state.remaining = read_chunk_size(state.reader).await?;
        if state.remaining == 0 {
            skip_trailers(state.reader).await?;
            return Ok(None);
        }
    }

    let available = state.reader.fill_buf().await?;
    if available.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed inside a body chunk",
        ));
    }
    let n = available
        .len()
        .min(READ_BUFFER_SIZE)
        .min(usize::try_from(state.remaining).unwrap_or(usize::MAX));
    let data = Bytes::copy_from_slice(&available[..n]);
    state.reader.consume(n);
    state.remaining -= n as u64;

    if state.remaining == 0 {
        let mut crlf = [0u8; 2];
        state.reader.read_exact(&mut crlf).await?;
        if &crlf != b"\r\n" {
            return Err(invalid_data("missing CRLF after body chunk"));
        }
    }
    Ok(Some((data, state)))
}

async fn read_chunk_size<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<u64> {
    let mut budget = MAX_HEAD_SIZE;
    let line = read_line(reader, &mut budget)
        .await
        .map_err(|e| invalid_data(e.to_string()))?
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "missing chunk size"))?;
    let size = line.split(';').next().unwrap_or("").trim();
    u64::from_str_radix(size, 16).map_err(|_| invalid_data(format!("invalid chunk size: {line}")))
}

async fn skip_trailers<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<()> {
    let mut budget = MAX_HEAD_SIZE;
    loop {
        match read_line(reader, &mut budget)
            .await
            .map_err(|e| invalid_data(e.to_string()))?
        {
            Some(line) if !line.is_empty() => continue,
            _ => return Ok(()),
        }
    }
}

/// JSON response sent before closing the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn ok(body: String) -> Self {
        Self { status: 200, body }
    }

    pub fn error(err: &ServerError) -> Self {
        Self {
            status: err.status_code(),
            body: serde_json::json!({ "error": err.to_string() }).to_string(),
        }
    }
}

pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &Response,
) -> io::Result<()> {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {APPLICATION_JSON}\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        reason_phrase(response.status),
        response.body.len()
    );
    if response.status == 405 {
        head.push_str("Allow: POST\r\n");
    }
    head.push_str("\r\n");
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(response.body.as_bytes()).await?;
    writer.flush().await
}

pub async fn write_continue<W: AsyncWrite + Unpin>(writer: &mut W) -> io::Result<()> {
    writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
    writer.flush().await
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        415 => "Unsupported Media Type",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

fn malformed(msg: impl Into<String>) -> ServerError {
    ServerError::MalformedRequest(msg.into())
}

fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}
