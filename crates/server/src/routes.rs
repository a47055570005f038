//! Endpoint routing and handlers.

use tokio::io::AsyncRead;
use tracing::debug;

use upbench_multipart::{MultipartDecoder, boundary_from_content_type};
use upbench_protocol::UploadResult;
use upbench_protocol::constants::{
    FILE_FIELD, MULTIPART_FILE_PATH, MULTIPART_FORM_DATA, MULTIPART_PATH, OCTET_STREAM,
    SINGLEPART_PATH,
};

use crate::ServerError;
use crate::consume::Consumer;
use crate::http::RequestHead;

/// A validated request, ready to consume its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Every part of a multipart body, one result each.
    Multipart { boundary: String },
    /// Only the part named `file1`.
    MultipartFile { boundary: String },
    /// The raw body as one stream.
    SinglePart,
}

impl Route {
    /// Validates method, path and content type without touching the body.
    pub fn resolve(head: &RequestHead) -> Result<Self, ServerError> {
        let path = head.path.as_str();
        if ![MULTIPART_PATH, MULTIPART_FILE_PATH, SINGLEPART_PATH].contains(&path) {
            return Err(ServerError::NotFound(path.to_string()));
        }
        if !head.method.eq_ignore_ascii_case("POST") {
            return Err(ServerError::MethodNotAllowed(format!(
                "{} {path}",
                head.method
            )));
        }

        let content_type = head.content_type().unwrap_or("");
        if path == SINGLEPART_PATH {
            require_media_type(content_type, OCTET_STREAM)?;
            return Ok(Route::SinglePart);
        }

        require_media_type(content_type, MULTIPART_FORM_DATA)?;
        let boundary = boundary_from_content_type(content_type)?;
        Ok(if path == MULTIPART_PATH {
            Route::Multipart { boundary }
        } else {
            Route::MultipartFile { boundary }
        })
    }

    /// Consumes `body` and returns the JSON response payload.
    ///
    /// Multipart routes answer with an array, the single-part route with a
    /// bare object. Nothing is reported unless the whole body was valid.
    pub async fn handle<R>(self, body: R, consumer: &Consumer) -> Result<String, ServerError>
    where
        R: AsyncRead + Unpin + Send,
    {
        match self {
            Route::Multipart { boundary } => {
                let mut decoder = MultipartDecoder::new(body, &boundary);
                let mut results: Vec<UploadResult> = Vec::new();
                while let Some(headers) = decoder.next_part().await? {
                    let result = consumer.consume(decoder.body()).await?;
                    debug!(
                        part = results.len(),
                        name = ?headers.field_name(),
                        bytes = result.bytes_received,
                        checksum = result.checksum,
                        "part consumed"
                    );
                    results.push(result);
                }
                Ok(serde_json::to_string(&results)?)
            }
            Route::MultipartFile { boundary } => {
                let mut decoder = MultipartDecoder::new(body, &boundary);
                let mut found: Option<UploadResult> = None;
                while let Some(headers) = decoder.next_part().await? {
                    if found.is_none() && headers.field_name().as_deref() == Some(FILE_FIELD) {
                        let result = consumer.consume(decoder.body()).await?;
                        debug!(
                            bytes = result.bytes_received,
                            checksum = result.checksum,
                            "file part consumed"
                        );
                        found = Some(result);
                    }
                }
                let result = found.ok_or_else(|| {
                    ServerError::MalformedRequest(format!("no part named '{FILE_FIELD}'"))
                })?;
                Ok(serde_json::to_string(&[result])?)
            }
            Route::SinglePart => {
                let result = consumer.consume(body).await?;
                debug!(
                    bytes = result.bytes_received,
                    checksum = result.checksum,
                    "single-part body consumed"
                );
                Ok(serde_json::to_string(&result)?)
            }
        }
    }
}

fn require_media_type(content_type: &str, expected: &str) -> Result<(), ServerError> {
    let media_type = content_type.split(';').next().unwrap_or("").trim();
    if media_type.eq_ignore_ascii_case(expected) {
        Ok(())
    } else if media_type.is_empty() {
        Err(ServerError::UnsupportedMediaType(format!(
            "missing Content-Type, expected {expected}"
        )))
    } else {
        Err(ServerError::UnsupportedMediaType(format!(
            "{media_type}, expected {expected}"
        )))
    }
}
