use std::sync::Arc;

use ingest_engine::HealthProbe;

use crate::adapters::{EventBridgePublisher, HttpFeedFetcher};
use crate::config::{Effective, WorkerArgs};
use crate::error::WorkerError;

/// Один health-check цикл: fetch + publish с detail-type health check'а.
/// Любая ошибка превращается в ненулевой код выхода в `main`.
pub async fn run(args: WorkerArgs) -> Result<(), WorkerError> {
    let eff = Effective::new(&args)?;

    let fetcher = HttpFeedFetcher::new(&eff.feed_url, eff.timeout).map_err(WorkerError::Fetcher)?;
    let publisher = EventBridgePublisher::from_env(eff.event_bus_name.as_str(), eff.timeout).await;

    let probe = HealthProbe::new(
        Arc::new(fetcher),
        Arc::new(publisher),
        &eff.envelope_fields(),
        &eff.health_detail_type,
    )
    .with_max_envelope_size(eff.max_envelope_size)
    .with_publish_timeout(eff.timeout);

    let report = probe.run().await?;
    tracing::info!(envelopes = report.published, bus = %eff.event_bus_name, "healthy");
    Ok(())
}
