//! Object store collaborator.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::READ_BUFFER_SIZE;

/// A boxed future returned by [`ObjectStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = io::Result<T>> + Send + 'a>>;

/// Durable sink for uploaded bodies.
pub trait ObjectStore: Send + Sync + 'static {
    /// Streams `body` into the object `id` and returns the bytes written.
    fn store<'a>(
        &'a self,
        id: Uuid,
        body: &'a mut (dyn AsyncRead + Unpin + Send),
    ) -> StoreFuture<'a, u64>;

    /// Opens the object `id` for reading.
    fn read(&self, id: Uuid) -> StoreFuture<'_, Box<dyn AsyncRead + Unpin + Send>>;
}

/// One file per object under a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Opens `root`, creating it if needed.
    pub async fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.root.join(id.to_string())
    }
}

impl ObjectStore for DirectoryStore {
    fn store<'a>(
        &'a self,
        id: Uuid,
        body: &'a mut (dyn AsyncRead + Unpin + Send),
    ) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let path = self.path_for(id);
            let file = tokio::fs::File::create(&path).await?;
            let mut writer = BufWriter::with_capacity(READ_BUFFER_SIZE, file);

            let result = async {
                let written = tokio::io::copy(body, &mut writer).await?;
                writer.flush().await?;
                Ok::<_, io::Error>(written)
            }
            .await;

            match result {
                Ok(written) => {
                    debug!(%id, bytes = written, "object stored");
                    Ok(written)
                }
                Err(e) => {
                    drop(writer);
                    if let Err(rm) = tokio::fs::remove_file(&path).await {
                        warn!(%id, "failed to remove partial object: {rm}");
                    }
                    Err(e)
                }
            }
        })
    }

    fn read(&self, id: Uuid) -> StoreFuture<'_, Box<dyn AsyncRead + Unpin + Send>> {
        Box::pin(async move {
            let file = tokio::fs::File::open(self.path_for(id)).await?;
            Ok(Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, file))
                as Box<dyn AsyncRead + Unpin + Send>)
        })
    }
}
