//! Command-line front end: NDJSON in, sanitized telemetry out.

pub mod cli;
pub mod logging;

pub use cli::{Cli, LogFormat};

use crate::config::TransportConfig;
use crate::sanitizer::ReplacementStrategy;
use crate::transport::DeliveryTransport;
use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Line counts for one ingest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestSummary {
    pub lines: usize,
    pub written: usize,
    pub skipped: usize,
}

pub async fn main() -> anyhow::Result<()> {
    run(Cli::parse()).await
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    logging::init_logging(cli.log_level, cli.log_format)?;

    let config = build_config(&cli)?;
    let transport = DeliveryTransport::builder(config)
        .build()
        .context("failed to start transport")?;

    let summary = match &cli.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            ingest_until_shutdown(&transport, BufReader::new(file)).await?
        }
        None => ingest_until_shutdown(&transport, BufReader::new(tokio::io::stdin())).await?,
    };

    transport.wait_idle().await;
    let report = transport.flush().await;
    transport.close().await;

    let http = transport.http_stats();
    info!(
        "Read {} lines: {} written, {} skipped; flush delivered {} queued events",
        summary.lines, summary.written, summary.skipped, report.delivered
    );
    info!(
        "HTTP requests: {} sent, {} failed, {:?} average response time",
        http.total_requests, http.failed_requests, http.average_response_time
    );
    println!("{}", serde_json::to_string(&transport.stats())?);
    Ok(())
}

fn build_config(cli: &Cli) -> anyhow::Result<TransportConfig> {
    let mut config =
        TransportConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    if let Some(endpoint) = &cli.endpoint {
        config.endpoint.clone_from(endpoint);
    }
    if let Some(path) = &cli.offline_path {
        config.offline_queue.storage_path = Some(path.clone());
    }
    if cli.strict {
        config.sanitizer.strategy = ReplacementStrategy::Redact;
    }

    config.validate()?;
    Ok(config)
}

async fn ingest_until_shutdown<R>(
    transport: &DeliveryTransport,
    reader: R,
) -> anyhow::Result<IngestSummary>
where
    R: AsyncBufRead + Unpin,
{
    tokio::select! {
        result = ingest(transport, reader) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, flushing and closing");
            Ok(IngestSummary::default())
        }
    }
}

/// Writes every NDJSON line through the transport.
///
/// Malformed lines are skipped. Line content is never logged since it has not
/// been sanitized yet.
pub async fn ingest<R>(transport: &DeliveryTransport, reader: R) -> anyhow::Result<IngestSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = IngestSummary::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        summary.lines += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let outcome = serde_json::from_str::<Value>(line)
            .map_err(|e| format!("invalid JSON at column {}", e.column()))
            .and_then(|value| transport.write(value).map_err(|e| e.to_string()));

        match outcome {
            Ok(()) => summary.written += 1,
            Err(reason) => {
                summary.skipped += 1;
                warn!("Skipping line {}: {}", summary.lines, reason);
            }
        }
    }

    Ok(summary)
}
