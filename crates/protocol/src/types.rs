use serde::{Deserialize, Serialize};

use crate::constants::RequestMode;

/// Outcome of consuming one body (one part, or one whole single-part request).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub bytes_received: u64,
    /// CRC32 of the consumed bytes.
    pub checksum: u32,
}

impl UploadResult {
    pub fn new(bytes_received: u64, checksum: u32) -> Self {
        Self {
            bytes_received,
            checksum,
        }
    }
}

/// Externally observed outcome of one upload attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportResponse {
    pub status_code: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            body: body.into(),
        }
    }

    /// Returns `true` for 2xx status codes.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Parses a server response body into upload results.
///
/// Multipart endpoints answer with an array, the single-part endpoint with
/// a bare object.
pub fn parse_results(mode: RequestMode, body: &str) -> Result<Vec<UploadResult>, serde_json::Error> {
    if mode.is_multipart() {
        serde_json::from_str(body)
    } else {
        serde_json::from_str::<UploadResult>(body).map(|result| vec![result])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_result_field_names() {
        let json = serde_json::to_string(&UploadResult::new(16, 0xDEAD_BEEF)).unwrap();
        assert_eq!(json, r#"{"bytesReceived":16,"checksum":3735928559}"#);
    }

    #[test]
    fn parse_multipart_array() {
        let body = r#"[{"bytesReceived":0,"checksum":0},{"bytesReceived":100,"checksum":7}]"#;
        let results = parse_results(RequestMode::MultipartWhole, body).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1], UploadResult::new(100, 7));
    }

    #[test]
    fn parse_single_object() {
        let body = r#"{"bytesReceived":5,"checksum":9}"#;
        let results = parse_results(RequestMode::SinglePart, body).unwrap();
        assert_eq!(results, vec![UploadResult::new(5, 9)]);
    }

    #[test]
    fn parse_rejects_wrong_shape() {
        let body = r#"{"bytesReceived":5,"checksum":9}"#;
        assert!(parse_results(RequestMode::MultipartNamedPart, body).is_err());
    }

    #[test]
    fn response_success_range() {
        let ok = TransportResponse {
            status_code: 200,
            body: String::new(),
        };
        let bad = TransportResponse {
            status_code: 400,
            body: String::new(),
        };
        assert!(ok.is_success());
        assert!(!bad.is_success());
    }
}
