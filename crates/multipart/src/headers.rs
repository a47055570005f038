//! Part header block parsing.

use crate::error::CodecError;

/// Headers of one multipart part. Names are stored lowercase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartHeaders {
    entries: Vec<(String, String)>,
}

impl PartHeaders {
    /// Parses a CRLF-separated header block (without the blank line).
    pub fn parse(block: &[u8]) -> Result<Self, CodecError> {
        let text = String::from_utf8_lossy(block);
        let mut entries = Vec::new();
        for line in text.split("\r\n").filter(|l| !l.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| CodecError::malformed(format!("invalid part header line: {line}")))?;
            entries.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
        Ok(Self { entries })
    }

    /// First value of `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `name` parameter of the Content-Disposition header.
    pub fn field_name(&self) -> Option<String> {
        header_param(self.get("content-disposition")?, "name", &[';'])
    }

    /// `filename` parameter of the Content-Disposition header.
    pub fn file_name(&self) -> Option<String> {
        header_param(self.get("content-disposition")?, "filename", &[';'])
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get("content-type")
    }
}

/// Extracts a `key=value` parameter from a structured header value.
///
/// Parameter names match case-insensitively; surrounding quotes are removed.
pub(crate) fn header_param(value: &str, key: &str, separators: &[char]) -> Option<String> {
    value.split(separators).skip(1).find_map(|param| {
        let (name, raw) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case(key) {
            return None;
        }
        let raw = raw.trim();
        let unquoted = raw
            .strip_prefix('"')
            .and_then(|r| r.strip_suffix('"'))
            .unwrap_or(raw);
        Some(unquoted.to_string())
    })
}
