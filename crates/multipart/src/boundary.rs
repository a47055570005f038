//! Boundary generation and extraction.

use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::error::CodecError;
use crate::headers::header_param;

/// Length of generated boundaries.
const BOUNDARY_LEN: usize = 30;

/// Generates a random alphanumeric boundary.
pub fn generate_boundary() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(BOUNDARY_LEN)
        .map(char::from)
        .collect()
}

/// Extracts the `boundary` parameter from a multipart Content-Type value.
pub fn boundary_from_content_type(content_type: &str) -> Result<String, CodecError> {
    match header_param(content_type, "boundary", &[';', ',']) {
        Some(boundary) if !boundary.is_empty() => Ok(boundary),
        _ => Err(CodecError::malformed(format!(
            "no boundary definition found in Content-Type header: {content_type}"
        ))),
    }
}
