use std::fmt;
use std::future::Future;
use std::io::Read;
use std::pin::Pin;
use std::str::FromStr;

use upbench_protocol::{RequestMode, TransportResponse};

use crate::blocking::BlockingBackend;
use crate::config::TransportConfig;
use crate::nonblocking::AsyncBackend;
use crate::ureq_client::UreqBackend;
use crate::TransportError;

/// A boxed future returned by [`Backend::send`].
pub type BackendFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + 'a>>;

/// Request body handed to a backend.
pub type UploadBody = Box<dyn Read + Send>;

/// Available client libraries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// `reqwest::blocking`, run on the blocking pool.
    Blocking,
    /// `reqwest` async client with a streamed body.
    Async,
    /// `ureq`, run on the blocking pool.
    Ureq,
}

impl BackendKind {
    pub fn all() -> &'static [BackendKind] {
        &[BackendKind::Blocking, BackendKind::Async, BackendKind::Ureq]
    }

    fn as_str(self) -> &'static str {
        match self {
            BackendKind::Blocking => "blocking",
            BackendKind::Async => "async",
            BackendKind::Ureq => "ureq",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendKind::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown backend '{s}' (expected blocking, async or ureq)"))
    }
}

/// One HTTP client implementation.
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Returns `true` if this backend can frame requests in `mode`.
    fn supports(&self, mode: RequestMode) -> bool;

    /// Posts `body` to `url` framed according to `mode`.
    ///
    /// Callers check [`supports`](Self::supports) first.
    fn send<'a>(&'a self, url: String, body: UploadBody, mode: RequestMode) -> BackendFuture<'a>;
}

/// Builds the backend for `kind`.
pub fn backend_for(
    kind: BackendKind,
    config: &TransportConfig,
) -> Result<Box<dyn Backend>, TransportError> {
    Ok(match kind {
        BackendKind::Blocking => Box::new(BlockingBackend::new(config.clone())),
        BackendKind::Async => Box::new(AsyncBackend::new(config)?),
        BackendKind::Ureq => Box::new(UreqBackend::new(config)),
    })
}
