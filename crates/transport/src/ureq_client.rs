//! `ureq` backend.
//!
//! ureq has no typed multipart builder, so only the workspace encoder and
//! raw bodies are available here.

use std::error::Error as _;
use std::io::{self, Read};

use tracing::debug;
use upbench_multipart::{MultipartEncoder, Part};
use upbench_protocol::constants::{FILE_FIELD, OCTET_STREAM};
use upbench_protocol::{RequestMode, TransportResponse};

use crate::TransportError;
use crate::backend::{Backend, BackendFuture, BackendKind, UploadBody};
use crate::config::TransportConfig;

pub struct UreqBackend {
    agent: ureq::Agent,
}

impl UreqBackend {
    pub fn new(config: &TransportConfig) -> Self {
        let mut builder = ureq::AgentBuilder::new()
            .timeout_connect(config.connect_timeout)
            .timeout_read(config.response_timeout);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            agent: builder.build(),
        }
    }
}

impl Backend for UreqBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ureq
    }

    fn supports(&self, mode: RequestMode) -> bool {
        mode != RequestMode::MultipartNamedPart
    }

    fn send<'a>(&'a self, url: String, body: UploadBody, mode: RequestMode) -> BackendFuture<'a> {
        let agent = self.agent.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || post(&agent, &url, body, mode))
                .await
                .map_err(|e| TransportError::Http(format!("ureq upload task failed: {e}")))?
        })
    }
}

fn post(
    agent: &ureq::Agent,
    url: &str,
    body: UploadBody,
    mode: RequestMode,
) -> Result<TransportResponse, TransportError> {
    let result = match mode {
        RequestMode::MultipartWhole => {
            let encoder = MultipartEncoder::new()
                .part(Part::new(FILE_FIELD, body).content_type(OCTET_STREAM));
            debug!(boundary = encoder.boundary(), "multipart body prepared");
            agent
                .post(url)
                .set("Content-Type", &encoder.content_type())
                .send(encoder)
        }
        RequestMode::SinglePart => agent
            .post(url)
            .set("Content-Type", OCTET_STREAM)
            .send(body),
        RequestMode::MultipartNamedPart => {
            return Err(TransportError::UnsupportedCombination {
                backend: BackendKind::Ureq,
                mode,
            });
        }
    };

    let response = match result {
        Ok(response) => response,
        // Non-2xx statuses are outcomes, not transport failures.
        Err(ureq::Error::Status(_, response)) => response,
        Err(ureq::Error::Transport(transport)) => return Err(map_transport_error(transport)),
    };

    let status_code = response.status();
    let mut text = String::new();
    response
        .into_reader()
        .read_to_string(&mut text)
        .map_err(map_io_error)?;
    Ok(TransportResponse::new(status_code, text))
}

fn map_transport_error(transport: ureq::Transport) -> TransportError {
    let timed_out = transport.kind() == ureq::ErrorKind::Io
        && transport
            .source()
            .and_then(|source| source.downcast_ref::<io::Error>())
            .is_some_and(is_timeout);
    if timed_out {
        TransportError::Timeout
    } else {
        TransportError::Http(transport.to_string())
    }
}

fn map_io_error(err: io::Error) -> TransportError {
    if is_timeout(&err) {
        TransportError::Timeout
    } else {
        TransportError::Io(err)
    }
}

/// Read timeouts surface as `TimedOut` or, on some platforms, `WouldBlock`.
fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}
