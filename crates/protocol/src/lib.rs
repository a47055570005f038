//! Wire types shared by the upload client and the upload server.
//!
//! Everything that crosses the HTTP boundary lives here: the JSON result
//! objects, the request modes with their endpoint paths, and the header
//! values both sides agree on.

pub mod constants;
pub mod types;

pub use constants::RequestMode;
pub use types::{TransportResponse, UploadResult, parse_results};
