use std::sync::Arc;
use std::time::Duration;

use ingest_api::{EnvelopeFields, EnvelopePublisher, RecordFetcher};

use crate::CycleError;
use crate::cycle::{CycleReport, IngestionCycle, OnFailure};

/// Detail-type health-check envelope'ов: правило шины отфильтровывает их
/// из обычной обработки.
pub const HEALTH_CHECK_DETAIL_TYPE: &str = "Health Check";

/// Liveness-проверка: ровно один цикл, синхронно, любая ошибка fetch/publish
/// поднимается наверх. Метрика не эмитится.
pub struct HealthProbe {
    cycle: IngestionCycle,
}

impl HealthProbe {
    /// `fields` — метаданные обычного ingestion'а; detail-type подменяется
    /// на `detail_type`.
    pub fn new(
        fetcher: Arc<dyn RecordFetcher>,
        publisher: Arc<dyn EnvelopePublisher>,
        fields: &EnvelopeFields,
        detail_type: &str,
    ) -> Self {
        let cycle = IngestionCycle::new(fetcher, publisher, fields.for_detail_type(detail_type))
            .with_on_failure(OnFailure::Escalate);
        Self { cycle }
    }

    pub fn with_max_envelope_size(mut self, max_envelope_size: usize) -> Self {
        self.cycle = self.cycle.with_max_envelope_size(max_envelope_size);
        self
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.cycle = self.cycle.with_publish_timeout(timeout);
        self
    }

    pub async fn run(&self) -> Result<CycleReport, CycleError> {
        let report = self.cycle.run().await?;
        tracing::info!(
            fetched = report.fetched,
            published = report.published,
            "health check passed"
        );
        Ok(report)
    }
}
