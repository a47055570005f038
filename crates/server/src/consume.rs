//! Body consumption: metering, checksumming and sinking one body.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};
use uuid::Uuid;

use upbench_checksum::Checked;
use upbench_metering::{MeteringConfig, Metered, MeteringLog};
use upbench_protocol::UploadResult;

use crate::store::ObjectStore;
use crate::{READ_BUFFER_SIZE, ServerError};

/// What happens to consumed bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsumeMode {
    #[default]
    Discard,
    Store,
}

/// Destination of consumed bytes.
#[derive(Clone)]
pub enum Sink {
    Discard,
    Store(Arc<dyn ObjectStore>),
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sink::Discard => f.write_str("Discard"),
            Sink::Store(_) => f.write_str("Store(..)"),
        }
    }
}

/// Where each body's metering log is written.
///
/// The file holds the log of the most recently finished body only. Each
/// export goes to a staging file renamed over `path`, so concurrent uploads
/// replace the file whole instead of interleaving rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsOutput {
    pub path: PathBuf,
    pub separator: char,
}

/// Reads bodies to completion and reports what was received.
#[derive(Debug, Clone)]
pub struct Consumer {
    sink: Sink,
    metering: MeteringConfig,
    stats: Option<StatsOutput>,
}

impl Consumer {
    pub fn new(sink: Sink, metering: MeteringConfig) -> Self {
        Self {
            sink,
            metering,
            stats: None,
        }
    }

    /// Discarding consumer with default metering and no stats file.
    pub fn discard() -> Self {
        Self::new(Sink::Discard, MeteringConfig::default())
    }

    pub fn with_stats(mut self, stats: StatsOutput) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Consumes `body` to its end.
    ///
    /// Bytes pass through metering, then checksumming, then the sink. The
    /// metering log is exported once the body is done; export failures are
    /// logged and do not fail the upload.
    pub async fn consume<R>(&self, body: R) -> Result<UploadResult, ServerError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut checked = Checked::new(Metered::new(body, self.metering));

        match &self.sink {
            Sink::Discard => {
                let mut buf = vec![0u8; READ_BUFFER_SIZE];
                while checked.read(&mut buf).await? > 0 {}
            }
            Sink::Store(store) => {
                let id = Uuid::new_v4();
                store.store(id, &mut checked).await?;
                debug!(%id, "body stored");
            }
        }

        let result = UploadResult::new(checked.byte_count(), checked.checksum());
        let log = checked.into_inner().into_log();
        debug!(
            bytes = result.bytes_received,
            checksum = result.checksum,
            buckets = log.len(),
            "body consumed"
        );
        if let Some(stats) = &self.stats {
            export_stats(stats, log).await;
        }
        Ok(result)
    }
}

/// Writes `log` on the blocking pool. Failures are logged only.
async fn export_stats(stats: &StatsOutput, log: MeteringLog) {
    let path = stats.path.clone();
    let separator = stats.separator;
    let staging = staging_path(&path);

    let written = tokio::task::spawn_blocking(move || {
        let result = log
            .save_csv(&staging, separator)
            .and_then(|()| std::fs::rename(&staging, &path));
        if result.is_err() {
            let _ = std::fs::remove_file(&staging);
        }
        result
    })
    .await;

    match written {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(path = %stats.path.display(), "failed to write metering log: {e}"),
        Err(e) => warn!(path = %stats.path.display(), "metering log export task failed: {e}"),
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.tmp", Uuid::new_v4()));
    path.with_file_name(name)
}
