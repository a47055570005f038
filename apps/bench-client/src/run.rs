//! One benchmark upload, start to finish.

use std::time::{Duration, Instant};

use anyhow::{Context, bail};

use upbench_checksum::Checked;
use upbench_metering::{Metered, MeteringConfig};
use upbench_payload::PayloadSpec;
use upbench_protocol::{RequestMode, TransportResponse, UploadResult, parse_results};
use upbench_transport::{BackendKind, TransportConfig};

use crate::Args;

/// Outcome of one upload as seen by the sender.
#[derive(Debug, Clone)]
pub struct Summary {
    pub backend: BackendKind,
    pub mode: RequestMode,
    pub bytes_sent: u64,
    pub checksum: u32,
    pub elapsed: Duration,
    pub response: TransportResponse,
    pub results: Vec<UploadResult>,
}

impl Summary {
    pub fn throughput_mb_per_sec(&self) -> f64 {
        throughput_mb_per_sec(self.bytes_sent, self.elapsed)
    }

    pub fn log(&self) {
        tracing::info!(
            backend = %self.backend,
            mode = %self.mode,
            bytes = self.bytes_sent,
            checksum = self.checksum,
            elapsed_ms = self.elapsed.as_millis() as u64,
            mb_per_sec = %format!("{:.2}", self.throughput_mb_per_sec()),
            status = self.response.status_code,
            "upload summary"
        );
        tracing::info!(body = %self.response.body, "server response");
    }

    /// Fails unless the server answered 2xx with the sender's checksum.
    pub fn verify(&self) -> anyhow::Result<()> {
        if !self.response.is_success() {
            bail!(
                "server answered {}: {}",
                self.response.status_code,
                self.response.body
            );
        }
        let Some(received) = self.results.first() else {
            bail!("server reported no upload results");
        };
        if received.checksum != self.checksum || received.bytes_received != self.bytes_sent {
            tracing::error!(
                sent_bytes = self.bytes_sent,
                sent_checksum = self.checksum,
                received_bytes = received.bytes_received,
                received_checksum = received.checksum,
                "checksum mismatch"
            );
            bail!("checksum mismatch");
        }
        tracing::info!(checksum = self.checksum, "checksum match");
        Ok(())
    }
}

/// Decimal megabytes per second.
pub fn throughput_mb_per_sec(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        return 0.0;
    }
    bytes as f64 / 1_000_000.0 / secs
}

pub fn payload_spec(args: &Args) -> PayloadSpec {
    if args.random_data {
        PayloadSpec::block_random(args.num_bytes, args.block_size, args.seed)
    } else {
        PayloadSpec::constant(args.num_bytes)
    }
}

pub fn transport_config(args: &Args) -> TransportConfig {
    TransportConfig {
        request_timeout: args.timeout_secs.map(Duration::from_secs),
        ..TransportConfig::new(args.base_url.clone())
    }
}

/// Builds the payload, uploads it and exports the sender-side metering log.
pub async fn run(args: &Args) -> anyhow::Result<Summary> {
    let spec = payload_spec(args);
    let source = spec.build().context("invalid payload parameters")?;
    let metering = MeteringConfig::with_bucket(Duration::from_millis(args.bucket_ms));
    let stream = Checked::new(Metered::new(source, metering));

    tracing::info!(
        backend = %args.backend,
        mode = %args.mode,
        bytes = spec.size,
        kind = ?spec.kind,
        url = %args.base_url,
        "starting upload"
    );

    let started = Instant::now();
    let attempt = upbench_transport::send(stream, args.mode, args.backend, &transport_config(args)).await;
    let elapsed = started.elapsed();

    let (bytes_sent, checksum) = match attempt.stream {
        Some(stream) => {
            let bytes = stream.byte_count();
            let checksum = stream.checksum();
            let log = stream.into_inner().into_log();
            match log.save_csv(&args.stats, args.stats_separator) {
                Ok(()) => tracing::info!(path = %args.stats.display(), rows = log.len(), "metering log written"),
                Err(e) => tracing::warn!(path = %args.stats.display(), "failed to write metering log: {e}"),
            }
            (bytes, checksum)
        }
        None => {
            tracing::warn!("upload stream not returned, sender statistics unavailable");
            (0, 0)
        }
    };

    let response = attempt
        .response
        .with_context(|| format!("upload via {} / {} failed", args.backend, args.mode))?;

    let results = if response.is_success() {
        parse_results(args.mode, &response.body).context("unexpected server response")?
    } else {
        Vec::new()
    };

    Ok(Summary {
        backend: args.backend,
        mode: args.mode,
        bytes_sent,
        checksum,
        elapsed,
        response,
        results,
    })
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::DEFAULT_NUM_BYTES;

    fn summary(status: u16, results: Vec<UploadResult>) -> Summary {
        Summary {
            backend: BackendKind::Blocking,
            mode: RequestMode::MultipartWhole,
            bytes_sent: 16,
            checksum: 1234,
            elapsed: Duration::from_secs(1),
            response: TransportResponse::new(status, "[]"),
            results,
        }
    }

    #[test]
    fn defaults_match_reference_run() {
        let args = Args::parse_from(["upbench-client"]);
        assert_eq!(args.backend, BackendKind::Blocking);
        assert_eq!(args.mode, RequestMode::MultipartWhole);
        assert_eq!(args.num_bytes, DEFAULT_NUM_BYTES);
        assert_eq!(args.num_bytes, 2_147_482_624);
        assert!(!args.random_data);
        assert_eq!(args.seed, 42);
        assert_eq!(args.block_size, 32);
        assert_eq!(args.base_url, "http://localhost:8080");
    }

    #[test]
    fn flags_map_onto_configs() {
        let args = Args::parse_from([
            "upbench-client",
            "--backend",
            "ureq",
            "--mode",
            "single-part",
            "--num-bytes",
            "1000",
            "--random-data",
            "--seed",
            "7",
            "--block-size",
            "4",
            "--base-url",
            "http://10.0.0.2:9000",
            "--timeout-secs",
            "120",
        ]);
        assert_eq!(args.backend, BackendKind::Ureq);
        assert_eq!(args.mode, RequestMode::SinglePart);
        assert_eq!(payload_spec(&args), PayloadSpec::block_random(1000, 4, 7));

        let config = transport_config(&args);
        assert_eq!(config.url_for(RequestMode::SinglePart), "http://10.0.0.2:9000/api/singlepart");
        assert_eq!(config.request_timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(Args::try_parse_from(["upbench-client", "--backend", "okhttp"]).is_err());
    }

    #[test]
    fn throughput_in_decimal_megabytes() {
        assert_eq!(throughput_mb_per_sec(5_000_000, Duration::from_secs(2)), 2.5);
        assert_eq!(throughput_mb_per_sec(100, Duration::ZERO), 0.0);
    }

    #[test]
    fn verify_accepts_matching_result() {
        assert!(summary(200, vec![UploadResult::new(16, 1234)]).verify().is_ok());
    }

    #[test]
    fn verify_rejects_mismatch_and_failure_status() {
        assert!(summary(200, vec![UploadResult::new(16, 999)]).verify().is_err());
        assert!(summary(200, vec![]).verify().is_err());
        assert!(summary(500, vec![UploadResult::new(16, 1234)]).verify().is_err());
    }
}
