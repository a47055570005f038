use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Endpoint consuming a `multipart/form-data` body, one result per part.
pub const MULTIPART_PATH: &str = "/api/multipart";

/// Endpoint consuming the single part named [`FILE_FIELD`].
pub const MULTIPART_FILE_PATH: &str = "/api/multipart/file";

/// Endpoint consuming a raw `application/octet-stream` body.
pub const SINGLEPART_PATH: &str = "/api/singlepart";

/// Form field name carrying the payload.
pub const FILE_FIELD: &str = "file1";

/// File name attached to the payload part by typed multipart builders.
pub const FILE_NAME: &str = "file";

pub const OCTET_STREAM: &str = "application/octet-stream";
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";
pub const APPLICATION_JSON: &str = "application/json";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default base URL used by the client.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// How an upload is framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestMode {
    /// The whole payload as one part, framed by the workspace's own encoder.
    #[serde(rename = "multipart-whole")]
    MultipartWhole,
    /// The payload as one named part, framed by the client library's form type.
    #[serde(rename = "multipart-named-part")]
    MultipartNamedPart,
    /// The payload as a raw, undelimited body.
    #[serde(rename = "single-part")]
    SinglePart,
}

impl RequestMode {
    /// Returns every request mode.
    pub fn all() -> &'static [RequestMode] {
        &[
            RequestMode::MultipartWhole,
            RequestMode::MultipartNamedPart,
            RequestMode::SinglePart,
        ]
    }

    /// Server path handling this mode.
    pub fn path(self) -> &'static str {
        match self {
            RequestMode::MultipartWhole => MULTIPART_PATH,
            RequestMode::MultipartNamedPart => MULTIPART_FILE_PATH,
            RequestMode::SinglePart => SINGLEPART_PATH,
        }
    }

    /// Returns `true` if the mode uses multipart framing.
    pub fn is_multipart(self) -> bool {
        !matches!(self, RequestMode::SinglePart)
    }

    fn as_str(self) -> &'static str {
        match self {
            RequestMode::MultipartWhole => "multipart-whole",
            RequestMode::MultipartNamedPart => "multipart-named-part",
            RequestMode::SinglePart => "single-part",
        }
    }
}

impl fmt::Display for RequestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestMode::all()
            .iter()
            .copied()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!("unknown request mode '{s}' (expected multipart-whole, multipart-named-part or single-part)")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_paths() {
        assert_eq!(RequestMode::MultipartWhole.path(), "/api/multipart");
        assert_eq!(RequestMode::MultipartNamedPart.path(), "/api/multipart/file");
        assert_eq!(RequestMode::SinglePart.path(), "/api/singlepart");
    }

    #[test]
    fn mode_parse_and_display() {
        for mode in RequestMode::all() {
            let parsed: RequestMode = mode.to_string().parse().unwrap();
            assert_eq!(parsed, *mode);
        }
        assert_eq!(
            "Single-Part".parse::<RequestMode>().unwrap(),
            RequestMode::SinglePart
        );
        assert!("chunked".parse::<RequestMode>().is_err());
    }

    #[test]
    fn mode_serialization() {
        assert_eq!(
            serde_json::to_string(&RequestMode::MultipartNamedPart).unwrap(),
            "\"multipart-named-part\""
        );
    }

    #[test]
    fn multipart_modes() {
        assert!(RequestMode::MultipartWhole.is_multipart());
        assert!(RequestMode::MultipartNamedPart.is_multipart());
        assert!(!RequestMode::SinglePart.is_multipart());
    }
}
