//! Streaming `multipart/form-data` codec.
//!
//! The [`MultipartEncoder`] turns a list of parts into a single blocking
//! reader, pulling each part body lazily so the full request never sits in
//! memory. The [`MultipartDecoder`] walks an async request body part by part,
//! exposing each body as an [`AsyncRead`](tokio::io::AsyncRead) that ends at
//! the next boundary.
//!
//! # Wire format
//!
//! ```text
//! --BOUNDARY\r\n
//! Content-Disposition: form-data; name="file1"\r\n
//! Content-Type: application/octet-stream\r\n
//! \r\n
//! <body bytes>\r\n
//! --BOUNDARY--\r\n
//! ```

pub mod boundary;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod headers;

pub use boundary::{boundary_from_content_type, generate_boundary};
pub use decoder::{MultipartDecoder, PartBody};
pub use encoder::{MultipartEncoder, Part};
pub use error::CodecError;
pub use headers::PartHeaders;

/// Upper bound for one part's header block.
pub const HEADER_BLOCK_MAX: usize = 10 * 1024;

/// Read granularity of the decoder (32 KB).
pub const READ_CHUNK: usize = 32 * 1024;
