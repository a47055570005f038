//! `reqwest::blocking` backend.

use reqwest::blocking::{Body, Client, multipart};
use reqwest::header::CONTENT_TYPE;
use tracing::debug;
use upbench_multipart::{MultipartEncoder, Part};
use upbench_protocol::constants::{FILE_FIELD, FILE_NAME, OCTET_STREAM};
use upbench_protocol::{RequestMode, TransportResponse};

use crate::backend::{Backend, BackendFuture, BackendKind, UploadBody};
use crate::config::TransportConfig;
use crate::reclaim::Reclaim;
use crate::{TransportError, nonblocking::map_reqwest_error};

/// Classic blocking client.
///
/// The client is created and dropped on the blocking pool since
/// `reqwest::blocking` must not run inside an async context.
///
/// `reqwest::blocking` has no read timeout, so the wait for the response is
/// bounded here: once the client drops the body, the task gets
/// `response_timeout` to finish. A task abandoned this way keeps its
/// blocking thread until the server closes the connection.
pub struct BlockingBackend {
    config: TransportConfig,
}

impl BlockingBackend {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

impl Backend for BlockingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Blocking
    }

    fn supports(&self, _mode: RequestMode) -> bool {
        true
    }

    fn send<'a>(&'a self, url: String, body: UploadBody, mode: RequestMode) -> BackendFuture<'a> {
        let config = self.config.clone();
        let response_timeout = config.response_timeout;
        Box::pin(async move {
            let (body, handle) = Reclaim::new(body);
            let mut task =
                tokio::task::spawn_blocking(move || post(&config, &url, Box::new(body), mode));

            tokio::select! {
                joined = &mut task => return join_result(joined),
                _ = handle.released() => {}
            }
            debug!("request body sent, waiting for response");

            match tokio::time::timeout(response_timeout, &mut task).await {
                Ok(joined) => join_result(joined),
                Err(_) => Err(TransportError::Timeout),
            }
        })
    }
}

fn join_result(
    joined: Result<Result<TransportResponse, TransportError>, tokio::task::JoinError>,
) -> Result<TransportResponse, TransportError> {
    joined.map_err(|e| TransportError::Http(format!("blocking upload task failed: {e}")))?
}

fn post(
    config: &TransportConfig,
    url: &str,
    body: UploadBody,
    mode: RequestMode,
) -> Result<TransportResponse, TransportError> {
    let client = Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .build()
        .map_err(map_reqwest_error)?;

    let request = client.post(url);
    let request = match mode {
        RequestMode::MultipartWhole => {
            let encoder = MultipartEncoder::new()
                .part(Part::new(FILE_FIELD, body).content_type(OCTET_STREAM));
            debug!(boundary = encoder.boundary(), "multipart body prepared");
            request
                .header(CONTENT_TYPE, encoder.content_type())
                .body(Body::new(encoder))
        }
        RequestMode::MultipartNamedPart => {
            let part = multipart::Part::reader(body)
                .file_name(FILE_NAME)
                .mime_str(OCTET_STREAM)
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            request.multipart(multipart::Form::new().part(FILE_FIELD, part))
        }
        RequestMode::SinglePart => request
            .header(CONTENT_TYPE, OCTET_STREAM)
            .body(Body::new(body)),
    };

    let response = request.send().map_err(map_reqwest_error)?;
    let status_code = response.status().as_u16();
    let body = response.text().map_err(map_reqwest_error)?;
    Ok(TransportResponse::new(status_code, body))
}
