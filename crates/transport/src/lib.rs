//! HTTP upload transports.
//!
//! [`send`] posts a byte stream to the benchmark server using one of several
//! interchangeable client libraries ([`BackendKind`]) and one of the request
//! modes in [`RequestMode`]. The stream is handed back to the caller with the
//! outcome so that checksum and metering state survive the upload, failed
//! or not.

mod backend;
mod blocking;
mod config;
mod nonblocking;
mod reclaim;
mod ureq_client;

pub use backend::{Backend, BackendFuture, BackendKind, UploadBody, backend_for};
pub use config::TransportConfig;
pub use reclaim::{Reclaim, ReclaimHandle};

use std::io::Read;
use std::time::Duration;

use tracing::{info, warn};
use upbench_protocol::{RequestMode, TransportResponse};

/// How long [`send`] waits for a backend to release the upload stream.
pub const RECLAIM_WAIT: Duration = Duration::from_secs(5);

/// Body chunk size used when streaming from a reader (64 KB).
pub const STREAM_CHUNK: usize = 64 * 1024;

/// Errors produced by the upload transports.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("request timed out")]
    Timeout,

    #[error("backend {backend} does not support request mode {mode}")]
    UnsupportedCombination {
        backend: BackendKind,
        mode: RequestMode,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Outcome of one upload together with the reclaimed stream.
#[derive(Debug)]
pub struct Attempt<S> {
    pub response: Result<TransportResponse, TransportError>,
    /// `None` only if the backend still held the stream after
    /// [`RECLAIM_WAIT`].
    pub stream: Option<S>,
}

impl<S> Attempt<S> {
    pub fn into_result(self) -> Result<TransportResponse, TransportError> {
        self.response
    }
}

/// Uploads `stream` with the given backend and request mode.
///
/// Unsupported backend/mode pairs fail before any network I/O. Non-2xx
/// statuses are returned in the response, not raised.
pub async fn send<S>(
    stream: S,
    mode: RequestMode,
    kind: BackendKind,
    config: &TransportConfig,
) -> Attempt<S>
where
    S: Read + Send + 'static,
{
    let backend = match backend_for(kind, config) {
        Ok(backend) => backend,
        Err(e) => {
            return Attempt {
                response: Err(e),
                stream: Some(stream),
            };
        }
    };

    if !backend.supports(mode) {
        return Attempt {
            response: Err(TransportError::UnsupportedCombination {
                backend: kind,
                mode,
            }),
            stream: Some(stream),
        };
    }

    let url = config.url_for(mode);
    info!(%url, backend = %kind, %mode, "upload started");

    let (body, handle) = Reclaim::new(stream);
    let response = backend.send(url, Box::new(body), mode).await;
    let stream = handle.recover(RECLAIM_WAIT).await;

    match &response {
        Ok(r) => info!(status = r.status_code, "upload finished"),
        Err(e) => warn!(error = %e, "upload failed"),
    }
    if stream.is_none() {
        warn!("upload stream was not released by the backend");
    }

    Attempt { response, stream }
}
