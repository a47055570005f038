//! Error types for the multipart codec.

use std::io;

/// Errors produced while encoding or decoding multipart bodies.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

impl CodecError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRequest(msg.into())
    }
}

impl From<CodecError> for io::Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => e,
            CodecError::MalformedRequest(msg) => io::Error::new(io::ErrorKind::InvalidData, msg),
        }
    }
}
