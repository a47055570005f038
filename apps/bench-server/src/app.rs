//! Wires settings into a running upload server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use upbench_server::{
    ConsumeMode, Consumer, DirectoryStore, ServerConfig, Sink, StatsOutput, UploadServer,
};

use crate::config::ServerSettings;

/// Runs the server until Ctrl-C.
pub async fn run(settings: ServerSettings) -> anyhow::Result<()> {
    let listen: SocketAddr = settings
        .listen
        .parse()
        .with_context(|| format!("invalid listen address '{}'", settings.listen))?;

    let sink = match settings.consume {
        ConsumeMode::Discard => Sink::Discard,
        ConsumeMode::Store => {
            let store = DirectoryStore::open(&settings.store_dir)
                .await
                .with_context(|| format!("cannot open store {}", settings.store_dir.display()))?;
            tracing::info!(dir = %store.root().display(), "storing uploads");
            Sink::Store(Arc::new(store))
        }
    };

    let mut consumer = Consumer::new(sink, settings.metering());
    if let Some(path) = settings.stats_path() {
        consumer = consumer.with_stats(StatsOutput {
            path,
            separator: settings.stats_separator,
        });
    }

    let config = ServerConfig {
        listen,
        header_timeout: settings.header_timeout(),
    };
    let server = UploadServer::new(config, consumer);
    let listener = server.bind().await?;

    let server_run = Arc::clone(&server);
    let serve = tokio::spawn(async move { server_run.serve(listener).await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("SIGINT received, shutting down");
    server.shutdown();

    serve.await??;
    Ok(())
}
