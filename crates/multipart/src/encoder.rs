//! Blocking multipart encoder.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Cursor, Read};

use crate::boundary::generate_boundary;

/// One named part of a multipart body.
pub struct Part {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    body: Box<dyn Read + Send>,
}

impl Part {
    pub fn new(name: impl Into<String>, body: impl Read + Send + 'static) -> Self {
        Self {
            name: name.into(),
            file_name: None,
            content_type: None,
            body: Box::new(body),
        }
    }

    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    fn header_block(&self, boundary: &str) -> Vec<u8> {
        let mut head = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"",
            self.name
        );
        if let Some(file_name) = &self.file_name {
            head.push_str(&format!("; filename=\"{file_name}\""));
        }
        head.push_str("\r\n");
        if let Some(content_type) = &self.content_type {
            head.push_str(&format!("Content-Type: {content_type}\r\n"));
        }
        head.push_str("\r\n");
        head.into_bytes()
    }
}

impl fmt::Debug for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Part")
            .field("name", &self.name)
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Streams a multipart body as a plain reader.
///
/// Part bodies are pulled only when the reader reaches them, and each body
/// is dropped as soon as it reports end of stream.
pub struct MultipartEncoder {
    boundary: String,
    parts: VecDeque<Part>,
    current: Option<Box<dyn Read + Send>>,
    pending: Cursor<Vec<u8>>,
    closed: bool,
}

impl MultipartEncoder {
    pub fn new() -> Self {
        Self::with_boundary(generate_boundary())
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: VecDeque::new(),
            current: None,
            pending: Cursor::new(Vec::new()),
            closed: false,
        }
    }

    pub fn part(mut self, part: Part) -> Self {
        self.parts.push_back(part);
        self
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Content-Type header value announcing this encoder's boundary.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Queues the next framing bytes; returns false once everything is written.
    fn advance(&mut self) -> bool {
        if let Some(part) = self.parts.pop_front() {
            self.pending = Cursor::new(part.header_block(&self.boundary));
            self.current = Some(part.body);
            true
        } else if !self.closed {
            self.closed = true;
            self.pending = Cursor::new(format!("--{}--\r\n", self.boundary).into_bytes());
            true
        } else {
            false
        }
    }
}

impl Default for MultipartEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MultipartEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartEncoder")
            .field("boundary", &self.boundary)
            .field("parts", &self.parts)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Read for MultipartEncoder {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let n = self.pending.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            if let Some(body) = self.current.as_mut() {
                let n = body.read(buf)?;
                if n > 0 {
                    return Ok(n);
                }
                self.current = None;
                self.pending = Cursor::new(b"\r\n".to_vec());
                continue;
            }
            if !self.advance() {
                return Ok(0);
            }
        }
    }
}
