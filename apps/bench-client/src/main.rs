//! upbench client entry point.

mod run;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use upbench_protocol::RequestMode;
use upbench_protocol::constants::DEFAULT_BASE_URL;
use upbench_transport::BackendKind;

/// Default payload size: 2 GiB minus 1 KiB.
pub const DEFAULT_NUM_BYTES: u64 = 2 * 1024 * 1024 * 1024 - 1024;

/// Streams a synthetic payload to an upbench server and reports throughput.
#[derive(Debug, Clone, Parser)]
#[command(name = "upbench-client", version)]
pub struct Args {
    /// HTTP client library: blocking, async or ureq.
    #[arg(long, default_value_t = BackendKind::Blocking)]
    pub backend: BackendKind,

    /// Request framing: multipart-whole, multipart-named-part or single-part.
    #[arg(long, default_value_t = RequestMode::MultipartWhole)]
    pub mode: RequestMode,

    /// Payload size in bytes.
    #[arg(long, default_value_t = DEFAULT_NUM_BYTES)]
    pub num_bytes: u64,

    /// Use the seeded block-random payload instead of constant 0xAA bytes.
    #[arg(long)]
    pub random_data: bool,

    /// PRNG seed for the random payload.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Run length of identical bytes in the random payload.
    #[arg(long, default_value_t = 32)]
    pub block_size: u64,

    /// Server root URL.
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Metering CSV output path.
    #[arg(long, default_value = "stats-client.csv")]
    pub stats: PathBuf,

    /// Separator between the CSV columns.
    #[arg(long, default_value_t = ' ')]
    pub stats_separator: char,

    /// Metering bucket width in milliseconds.
    #[arg(long, default_value_t = 10)]
    pub bucket_ms: u64,

    /// Optional bound on the whole request, in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting upbench client");

    let args = Args::parse();
    let rt = tokio::runtime::Runtime::new()?;
    let summary = rt.block_on(run::run(&args))?;
    summary.log();
    summary.verify()
}
