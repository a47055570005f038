//! Returning the upload stream to its owner.
//!
//! Client libraries take ownership of request bodies. [`Reclaim`] wraps the
//! caller's stream and sends it back over a oneshot channel when the library
//! drops the body, so wrapper state (checksum, metering) stays reachable.

use std::io::{self, Read};
use std::time::Duration;

use tokio::sync::oneshot;

/// Body wrapper that hands its stream back on drop.
#[derive(Debug)]
pub struct Reclaim<S> {
    inner: Option<S>,
    tx: Option<oneshot::Sender<S>>,
}

/// Receiving side of a [`Reclaim`].
#[derive(Debug)]
pub struct ReclaimHandle<S> {
    rx: oneshot::Receiver<S>,
}

impl<S> Reclaim<S> {
    pub fn new(inner: S) -> (Self, ReclaimHandle<S>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                inner: Some(inner),
                tx: Some(tx),
            },
            ReclaimHandle { rx },
        )
    }
}

impl<S: Read> Read for Reclaim<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.as_mut() {
            Some(inner) => inner.read(buf),
            None => Ok(0),
        }
    }
}

impl<S> Drop for Reclaim<S> {
    fn drop(&mut self) {
        if let (Some(inner), Some(tx)) = (self.inner.take(), self.tx.take()) {
            let _ = tx.send(inner);
        }
    }
}

impl<S> ReclaimHandle<S> {
    /// Resolves once the body was dropped, with no upper bound.
    pub async fn released(self) -> Option<S> {
        self.rx.await.ok()
    }

    /// Waits up to `wait` for the body to be dropped and returns the stream.
    pub async fn recover(self, wait: Duration) -> Option<S> {
        match tokio::time::timeout(wait, self.rx).await {
            Ok(Ok(stream)) => Some(stream),
            _ => None,
        }
    }
}
