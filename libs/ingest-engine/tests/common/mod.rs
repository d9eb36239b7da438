use std::sync::Arc;

use ingest_api::{EnvelopeFields, Record};
use ingest_engine::test_utils::{RecordingMetrics, RecordingPublisher, ScriptedFetcher};
use ingest_engine::{IngestionCycle, MetricsReporter};

pub const STREAM_ARN: &str = "arn:aws:kinesis:eu-west-1:123456789012:stream/ingestion";

/// Метаданные с фиксированным overhead'ом ровно `overhead` байт
/// (source + detail-type, без resources и timestamp'а).
pub fn fields_with_overhead(overhead: usize) -> EnvelopeFields {
    let source_len = ingest_api::DEFAULT_SOURCE.len();
    EnvelopeFields::new("d".repeat(overhead - source_len))
}

/// Уникальная запись ровно в `len` байт: номер, дополненный нулями, в JSON-строке.
pub fn numbered_record(n: usize, len: usize) -> Record {
    let width = len - 2;
    Record::parse(&format!("\"{n:0>width$}\"")).unwrap()
}

pub struct Harness {
    pub fetcher: Arc<ScriptedFetcher>,
    pub publisher: Arc<RecordingPublisher>,
    pub metrics: Arc<RecordingMetrics>,
}

impl Harness {
    pub fn new(fetcher: ScriptedFetcher) -> Self {
        Self::with_publisher(fetcher, RecordingPublisher::new())
    }

    pub fn with_publisher(fetcher: ScriptedFetcher, publisher: RecordingPublisher) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            publisher: Arc::new(publisher),
            metrics: Arc::new(RecordingMetrics::new()),
        }
    }

    /// Обычный ingestion-цикл (ошибки глотаются, метрика включена).
    pub fn ingestion_cycle(&self, fields: EnvelopeFields) -> IngestionCycle {
        IngestionCycle::new(self.fetcher.clone(), self.publisher.clone(), fields)
            .with_reporter(MetricsReporter::new(self.metrics.clone()))
    }
}
