use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use ingest_engine::{CycleScheduler, IngestionCycle, MetricsReporter};

use crate::adapters::{EmfMetricsSink, EventBridgePublisher, HttpFeedFetcher};
use crate::config::{Effective, WorkerArgs};
use crate::error::WorkerError;

pub async fn run(args: WorkerArgs) -> Result<(), WorkerError> {
    tracing::info!("ingestion-worker starting");

    // --- Load config ---
    let eff = Effective::new(&args)?;
    tracing::info!(
        config = %args.config,
        bus = %eff.event_bus_name,
        detail_type = %eff.detail_type,
        interval_ms = eff.interval.as_millis() as u64,
        max_envelope_size = eff.max_envelope_size,
        stream = eff.data_stream_arn.as_deref().unwrap_or("-"),
        "loaded config"
    );

    // --- Collaborators ---
    let fetcher = HttpFeedFetcher::new(&eff.feed_url, eff.timeout).map_err(WorkerError::Fetcher)?;
    let publisher = EventBridgePublisher::from_env(eff.event_bus_name.as_str(), eff.timeout).await;
    let metrics = EmfMetricsSink::stdout();

    let cycle = IngestionCycle::new(Arc::new(fetcher), Arc::new(publisher), eff.envelope_fields())
        .with_reporter(MetricsReporter::new(Arc::new(metrics)))
        .with_max_envelope_size(eff.max_envelope_size)
        .with_publish_timeout(eff.timeout);

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();
    let scheduler = tokio::spawn(CycleScheduler::new(cycle, eff.interval).run(token.clone()));
    tracing::info!(feed = %eff.feed_url, "worker ready");

    // --- Ожидание Ctrl+C ---
    let signal = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down, waiting for the in-flight cycle...");
    token.cancel();

    match scheduler.await {
        Ok(stats) => tracing::info!(started = stats.started, skipped = stats.skipped, "shutdown complete"),
        Err(e) => tracing::error!(error = %e, "scheduler task failed"),
    }
    signal?;
    Ok(())
}
