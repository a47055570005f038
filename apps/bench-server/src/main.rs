//! upbench server entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Upload sink measuring throughput and checksums of incoming bodies.
#[derive(Debug, Parser)]
#[command(name = "upbench-server", version)]
struct Args {
    /// Settings file (defaults to ./upbench-server.toml when present).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the listen address from the settings file.
    #[arg(short, long)]
    listen: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting upbench server");

    let args = Args::parse();
    let mut settings = config::ServerSettings::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        settings.listen = listen;
    }
    tracing::info!(
        listen = %settings.listen,
        consume = ?settings.consume,
        bucket_ms = settings.bucket_ms,
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(settings))?;

    tracing::info!("server shut down cleanly");
    Ok(())
}
