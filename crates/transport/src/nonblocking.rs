//! `reqwest` async backend.

use std::io::{self, Read};
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Body, Client, multipart};
use tracing::debug;
use upbench_multipart::{MultipartEncoder, Part};
use upbench_protocol::constants::{FILE_FIELD, FILE_NAME, OCTET_STREAM};
use upbench_protocol::{RequestMode, TransportResponse};

use crate::backend::{Backend, BackendFuture, BackendKind, UploadBody};
use crate::config::TransportConfig;
use crate::{STREAM_CHUNK, TransportError};

/// Non-blocking client streaming the body chunk by chunk.
pub struct AsyncBackend {
    client: Client,
    request_timeout: Option<std::time::Duration>,
}

impl AsyncBackend {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.response_timeout)
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self {
            client,
            request_timeout: config.request_timeout,
        })
    }
}

impl Backend for AsyncBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Async
    }

    fn supports(&self, _mode: RequestMode) -> bool {
        true
    }

    fn send<'a>(&'a self, url: String, body: UploadBody, mode: RequestMode) -> BackendFuture<'a> {
        Box::pin(async move {
            let mut request = self.client.post(&url);
            if let Some(timeout) = self.request_timeout {
                request = request.timeout(timeout);
            }

            let request = match mode {
                RequestMode::MultipartWhole => {
                    let encoder = MultipartEncoder::new()
                        .part(Part::new(FILE_FIELD, body).content_type(OCTET_STREAM));
                    debug!(boundary = encoder.boundary(), "multipart body prepared");
                    request
                        .header(CONTENT_TYPE, encoder.content_type())
                        .body(reader_body(encoder))
                }
                RequestMode::MultipartNamedPart => {
                    let part = multipart::Part::stream(reader_body(body))
                        .file_name(FILE_NAME)
                        .mime_str(OCTET_STREAM)
                        .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
                    request.multipart(multipart::Form::new().part(FILE_FIELD, part))
                }
                RequestMode::SinglePart => request
                    .header(CONTENT_TYPE, OCTET_STREAM)
                    .body(reader_body(body)),
            };

            let response = request.send().await.map_err(map_reqwest_error)?;
            let status_code = response.status().as_u16();
            let body = response.text().await.map_err(map_reqwest_error)?;
            Ok(TransportResponse::new(status_code, body))
        })
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Http(err.to_string())
    }
}

fn reader_body<R: Read + Send + Unpin + 'static>(reader: R) -> Body {
    Body::wrap_stream(ReaderStream {
        reader: Some(Mutex::new(reader)),
    })
}

/// Chunked stream over a blocking reader.
///
/// Reads happen inline on poll, so the reader must not block for long;
/// payload generators and their wrappers never do. The reader is dropped as
/// soon as it reports end of stream or an error.
struct ReaderStream<R> {
    reader: Option<Mutex<R>>,
}

impl<R: Read + Unpin> Stream for ReaderStream<R> {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(slot) = this.reader.as_mut() else {
            return Poll::Ready(None);
        };
        let reader = slot.get_mut().unwrap_or_else(PoisonError::into_inner);

        let mut chunk = BytesMut::zeroed(STREAM_CHUNK);
        let result = loop {
            match reader.read(&mut chunk) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => break other,
            }
        };

        match result {
            Ok(0) => {
                this.reader = None;
                Poll::Ready(None)
            }
            Ok(n) => {
                chunk.truncate(n);
                Poll::Ready(Some(Ok(chunk.freeze())))
            }
            Err(e) => {
                this.reader = None;
                Poll::Ready(Some(Err(e)))
            }
        }
    }
}
