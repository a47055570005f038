//! Upload sink server.
//!
//! Accepts HTTP/1.1 uploads on the benchmark endpoints, pushes every body
//! through metering and checksum wrappers, and answers with the per-body
//! [`UploadResult`](upbench_protocol::UploadResult) as JSON. One request is
//! served per connection.

mod consume;
mod http;
mod routes;
mod server;
mod store;

pub use consume::{ConsumeMode, Consumer, Sink, StatsOutput};
pub use http::{RequestHead, Response};
pub use routes::Route;
pub use server::{ServerConfig, UploadServer};
pub use store::{DirectoryStore, ObjectStore, StoreFuture};

use std::time::Duration;

use upbench_multipart::CodecError;

/// Socket read buffer and body copy buffer size (32 KB).
pub const READ_BUFFER_SIZE: usize = 32 * 1024;

/// Upper bound for the request line plus headers.
pub const MAX_HEAD_SIZE: usize = 16 * 1024;

/// Default wait for a complete request head.
pub const HEADER_TIMEOUT: Duration = Duration::from_secs(30);

/// How long the rest of a rejected request is drained before closing.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors produced while serving a request.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("timed out waiting for request")]
    Timeout,
}

impl ServerError {
    /// HTTP status reported for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::MalformedRequest(_) => 400,
            ServerError::Io(e) if e.kind() == std::io::ErrorKind::InvalidData => 400,
            ServerError::NotFound(_) => 404,
            ServerError::MethodNotAllowed(_) => 405,
            ServerError::Timeout => 408,
            ServerError::UnsupportedMediaType(_) => 415,
            ServerError::Io(_) | ServerError::Json(_) => 500,
        }
    }
}

impl From<CodecError> for ServerError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::MalformedRequest(msg) => ServerError::MalformedRequest(msg),
            CodecError::Io(e) => ServerError::Io(e),
        }
    }
}
