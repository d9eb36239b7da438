use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use ingest_api::size::{detail_size, entry_size};
use ingest_api::{
    Envelope, EnvelopeFields, EnvelopePublisher, IngestError, MAX_ENVELOPE_SIZE, MetricsSink,
    RecordBatch, RecordFetcher,
};

use crate::CycleError;
use crate::packer::pack;

// ═══════════════════════════════════════════════════════════════
//  Failure policy / report
// ═══════════════════════════════════════════════════════════════

/// Что делать с ошибками fetch/publish внутри цикла.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnFailure {
    /// Залогировать и продолжить (обычный ingestion, best-effort).
    #[default]
    LogAndContinue,
    /// Поднять `CycleError` наверх (health probe).
    Escalate,
}

/// Итог одного цикла.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Записей получено от feed'а.
    pub fetched: usize,
    /// Envelope'ов собрано packer'ом (все отданы publisher'у).
    pub envelopes: usize,
    /// Записей выброшено как не влезающие в envelope.
    pub discarded: usize,
    /// Успешных publish.
    pub published: usize,
    /// Неуспешных publish.
    pub failed: usize,
    /// Сумма размеров успешно отданных envelope'ов — то, что уходит в метрику.
    pub bytes_published: u64,
}

// ═══════════════════════════════════════════════════════════════
//  MetricsReporter
// ═══════════════════════════════════════════════════════════════

/// Одно наблюдение "bytes ingested" за цикл. Ошибки только логируются.
#[derive(Clone)]
pub struct MetricsReporter {
    sink: Arc<dyn MetricsSink>,
}

impl MetricsReporter {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink }
    }

    pub async fn report(&self, total_bytes: u64) {
        match self.sink.put_ingested_bytes(total_bytes).await {
            Ok(()) => tracing::debug!(bytes = total_bytes, "reported ingested data size"),
            Err(e) => {
                tracing::warn!(bytes = total_bytes, error = %e, kind = %e.kind(), "failed to emit metric")
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  IngestionCycle — Fetch → Pack → Publish-all → Report
// ═══════════════════════════════════════════════════════════════

/// Один полный цикл ingestion'а над явно переданными коллабораторами.
///
/// Всё состояние цикла (batch, envelope'ы) локально для `run()`,
/// поэтому один `IngestionCycle` можно шарить между тиками.
#[derive(Clone)]
pub struct IngestionCycle {
    fetcher: Arc<dyn RecordFetcher>,
    publisher: Arc<dyn EnvelopePublisher>,
    reporter: Option<MetricsReporter>,
    fields: Arc<EnvelopeFields>,
    max_envelope_size: usize,
    /// Потолок на один publish; без него зависший вызов держит цикл вечно.
    publish_timeout: Option<Duration>,
    on_failure: OnFailure,
}

#[derive(Default)]
struct PublishSummary {
    published: usize,
    bytes: u64,
    errors: Vec<IngestError>,
}

impl IngestionCycle {
    pub fn new(
        fetcher: Arc<dyn RecordFetcher>,
        publisher: Arc<dyn EnvelopePublisher>,
        fields: EnvelopeFields,
    ) -> Self {
        Self {
            fetcher,
            publisher,
            reporter: None,
            fields: Arc::new(fields),
            max_envelope_size: MAX_ENVELOPE_SIZE,
            publish_timeout: None,
            on_failure: OnFailure::default(),
        }
    }

    pub fn with_reporter(mut self, reporter: MetricsReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_max_envelope_size(mut self, max_envelope_size: usize) -> Self {
        self.max_envelope_size = max_envelope_size;
        self
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = Some(timeout);
        self
    }

    pub fn with_on_failure(mut self, on_failure: OnFailure) -> Self {
        self.on_failure = on_failure;
        self
    }

    pub fn fields(&self) -> &EnvelopeFields {
        &self.fields
    }

    pub fn on_failure(&self) -> OnFailure {
        self.on_failure
    }

    /// Выполнить цикл до конца: все publish'и дожидаются до отчёта метрики.
    pub async fn run(&self) -> Result<CycleReport, CycleError> {
        let Some(batch) = self.fetch().await? else {
            return Ok(CycleReport::default());
        };

        let mut report = CycleReport { fetched: batch.len(), ..Default::default() };
        if batch.is_empty() {
            tracing::debug!("feed returned an empty batch, nothing to publish");
            return Ok(report);
        }

        tracing::debug!(
            size = self.whole_batch_size(&batch),
            max_size = self.max_envelope_size,
            "full data entry size"
        );

        let outcome = pack(batch.into_records(), &self.fields, self.max_envelope_size);
        report.envelopes = outcome.envelopes.len();
        report.discarded = outcome.discarded.len();

        if outcome.envelopes.is_empty() {
            tracing::info!(
                fetched = report.fetched,
                discarded = report.discarded,
                "no envelope to publish"
            );
            return Ok(report);
        }

        let summary = self.publish_all(outcome.envelopes).await;
        report.published = summary.published;
        report.failed = summary.errors.len();
        report.bytes_published = summary.bytes;

        if let Some(reporter) = &self.reporter {
            reporter.report(report.bytes_published).await;
        }

        tracing::info!(
            fetched = report.fetched,
            envelopes = report.envelopes,
            discarded = report.discarded,
            published = report.published,
            failed = report.failed,
            bytes = report.bytes_published,
            bus_detail_type = %self.fields.detail_type,
            "cycle complete"
        );

        if self.on_failure == OnFailure::Escalate {
            if let Some(source) = summary.errors.into_iter().next() {
                return Err(CycleError::Publish {
                    failed: report.failed,
                    total: report.envelopes,
                    source,
                });
            }
        }

        Ok(report)
    }

    async fn fetch(&self) -> Result<Option<RecordBatch>, CycleError> {
        match self.fetcher.fetch().await {
            Ok(batch) => {
                tracing::info!(records = batch.len(), "pulled data points from the feed");
                Ok(Some(batch))
            }
            Err(e) => match self.on_failure {
                OnFailure::Escalate => {
                    tracing::error!(error = %e, kind = %e.kind(), "failed to get data from the feed");
                    Err(CycleError::Fetch(e))
                }
                OnFailure::LogAndContinue => {
                    tracing::warn!(error = %e, kind = %e.kind(), "failed to get data from the feed, skipping cycle");
                    Ok(None)
                }
            },
        }
    }

    /// Размер, который имел бы весь batch одним envelope'ом.
    fn whole_batch_size(&self, batch: &RecordBatch) -> usize {
        let bytes: usize = batch.records().iter().map(|r| r.len()).sum();
        entry_size(&self.fields, None) + detail_size(bytes, batch.len())
    }

    /// Отправить все envelope'ы конкурентно и дождаться каждого.
    ///
    /// Ошибка одного publish не отменяет остальные.
    async fn publish_all(&self, envelopes: Vec<Envelope>) -> PublishSummary {
        let total = envelopes.len();
        let mut tasks = JoinSet::new();
        for (index, envelope) in envelopes.into_iter().enumerate() {
            let publisher = self.publisher.clone();
            let timeout = self.publish_timeout;
            tasks.spawn(async move {
                let size = envelope.size();
                let records = envelope.records().len();
                let published = match timeout {
                    Some(limit) => tokio::time::timeout(limit, publisher.publish(&envelope))
                        .await
                        .unwrap_or_else(|_| {
                            Err(IngestError::timeout(format!("publish did not finish within {limit:?}")))
                        }),
                    None => publisher.publish(&envelope).await,
                };
                published.map(|()| (index, records, size)).map_err(|e| (index, e))
            });
        }

        let mut summary = PublishSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok((index, records, size))) => {
                    tracing::debug!(envelope = index + 1, total, records, size, "pushed envelope on the bus");
                    summary.published += 1;
                    summary.bytes += size as u64;
                }
                Ok(Err((index, e))) => {
                    self.log_publish_failure(index + 1, total, &e);
                    summary.errors.push(e);
                }
                Err(join_err) => {
                    tracing::error!(total, error = %join_err, "publish task aborted");
                    summary.errors.push(IngestError::io(format!("publish task aborted: {join_err}")));
                }
            }
        }
        summary
    }

    fn log_publish_failure(&self, envelope: usize, total: usize, e: &IngestError) {
        match self.on_failure {
            OnFailure::Escalate => {
                tracing::error!(envelope, total, error = %e, kind = %e.kind(), "failed to push data on the bus")
            }
            OnFailure::LogAndContinue => {
                tracing::warn!(envelope, total, error = %e, kind = %e.kind(), "failed to push data on the bus")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ingest_api::ErrorKind;

    use super::*;
    use crate::test_utils::{
        RecordingMetrics, RecordingPublisher, ScriptedFetcher, batch_of_sizes, record_of_len,
    };

    fn cycle(
        fetcher: &Arc<ScriptedFetcher>,
        publisher: &Arc<RecordingPublisher>,
        metrics: &Arc<RecordingMetrics>,
    ) -> IngestionCycle {
        IngestionCycle::new(fetcher.clone(), publisher.clone(), EnvelopeFields::new("Incoming Data"))
            .with_reporter(MetricsReporter::new(metrics.clone()))
    }

    #[tokio::test]
    async fn reports_bytes_of_published_envelopes() {
        let fetcher = Arc::new(ScriptedFetcher::new([Ok(batch_of_sizes(&[300; 30]))]));
        let publisher = Arc::new(RecordingPublisher::new());
        let metrics = Arc::new(RecordingMetrics::new());

        let report = cycle(&fetcher, &publisher, &metrics)
            .with_max_envelope_size(2_000)
            .run()
            .await
            .unwrap();

        let sent = publisher.published();
        assert!(sent.len() > 1);
        assert_eq!(report.envelopes, sent.len());
        let expected: u64 = sent.iter().map(|e| e.size() as u64).sum();
        assert_eq!(report.bytes_published, expected);
        assert_eq!(metrics.observations(), vec![expected]);
    }

    #[tokio::test]
    async fn failed_publishes_are_excluded_from_metric_and_do_not_block_others() {
        let fetcher = Arc::new(ScriptedFetcher::new([Ok(batch_of_sizes(&[500; 12]))]));
        // каждая вторая попытка отклоняется
        let publisher = Arc::new(RecordingPublisher::failing_when(|attempt, _| attempt % 2 == 1));
        let metrics = Arc::new(RecordingMetrics::new());

        let report = cycle(&fetcher, &publisher, &metrics)
            .with_max_envelope_size(1_600)
            .run()
            .await
            .expect("normal cycle swallows publish errors");

        assert_eq!(report.envelopes, 4);
        assert_eq!(publisher.attempts(), 4);
        assert_eq!((report.published, report.failed), (2, 2));
        let ok_bytes: u64 = publisher.published().iter().map(|e| e.size() as u64).sum();
        assert_eq!(report.bytes_published, ok_bytes);
        assert_eq!(metrics.observations(), vec![ok_bytes]);
    }

    #[tokio::test]
    async fn fetch_failure_in_normal_mode_is_swallowed() {
        let fetcher = Arc::new(ScriptedFetcher::new([Err(IngestError::timeout("slow feed"))]));
        let publisher = Arc::new(RecordingPublisher::new());
        let metrics = Arc::new(RecordingMetrics::new());

        let report = cycle(&fetcher, &publisher, &metrics).run().await.unwrap();

        assert_eq!(report, CycleReport::default());
        assert_eq!(publisher.attempts(), 0);
        assert!(metrics.observations().is_empty());
    }

    #[tokio::test]
    async fn escalated_publish_failure_carries_counts() {
        let fetcher = Arc::new(ScriptedFetcher::new([Ok(batch_of_sizes(&[100; 3]))]));
        let publisher = Arc::new(RecordingPublisher::failing_when(|_, _| true));
        let metrics = Arc::new(RecordingMetrics::new());

        let err = cycle(&fetcher, &publisher, &metrics)
            .with_on_failure(OnFailure::Escalate)
            .run()
            .await
            .unwrap_err();

        match err {
            CycleError::Publish { failed, total, source } => {
                assert_eq!((failed, total), (1, 1));
                assert_eq!(source.kind(), ErrorKind::Rejected);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn metric_failure_never_fails_the_cycle() {
        let fetcher = Arc::new(ScriptedFetcher::new([Ok(batch_of_sizes(&[100; 3]))]));
        let publisher = Arc::new(RecordingPublisher::new());
        let metrics = Arc::new(RecordingMetrics::failing());

        let report = cycle(&fetcher, &publisher, &metrics)
            .with_on_failure(OnFailure::Escalate)
            .run()
            .await
            .unwrap();
        assert_eq!(report.published, 1);
        assert_eq!(metrics.attempts(), 1);
    }

    #[tokio::test]
    async fn all_records_discarded_means_no_publish_and_no_metric() {
        let fetcher = Arc::new(ScriptedFetcher::new([Ok(RecordBatch::new(vec![record_of_len(5_000)]))]));
        let publisher = Arc::new(RecordingPublisher::new());
        let metrics = Arc::new(RecordingMetrics::new());

        let report = cycle(&fetcher, &publisher, &metrics)
            .with_max_envelope_size(1_000)
            .run()
            .await
            .unwrap();

        assert_eq!(report.discarded, 1);
        assert_eq!(report.envelopes, 0);
        assert_eq!(publisher.attempts(), 0);
        assert!(metrics.observations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_publish_times_out_and_frees_the_cycle() {
        let fetcher = Arc::new(ScriptedFetcher::new([Ok(batch_of_sizes(&[100; 3]))]));
        let publisher = Arc::new(RecordingPublisher::new().with_delay(Duration::from_secs(3_600)));
        let metrics = Arc::new(RecordingMetrics::new());

        let started = tokio::time::Instant::now();
        let report = cycle(&fetcher, &publisher, &metrics)
            .with_publish_timeout(Duration::from_millis(500))
            .run()
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!((report.published, report.failed), (0, 1));
        assert_eq!(metrics.observations(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_publish_escalates_as_timeout() {
        let fetcher = Arc::new(ScriptedFetcher::new([Ok(batch_of_sizes(&[100; 3]))]));
        let publisher = Arc::new(RecordingPublisher::new().with_delay(Duration::from_secs(3_600)));
        let metrics = Arc::new(RecordingMetrics::new());

        let err = cycle(&fetcher, &publisher, &metrics)
            .with_publish_timeout(Duration::from_millis(500))
            .with_on_failure(OnFailure::Escalate)
            .run()
            .await
            .unwrap_err();

        match err {
            CycleError::Publish { source, .. } => assert_eq!(source.kind(), ErrorKind::Timeout),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    struct PanickingPublisher;

    impl EnvelopePublisher for PanickingPublisher {
        fn publish<'a>(
            &'a self,
            _envelope: &'a Envelope,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), IngestError>> + Send + 'a>> {
            Box::pin(explode())
        }
    }

    async fn explode() -> Result<(), IngestError> {
        panic!("publisher bug")
    }

    #[tokio::test]
    async fn aborted_publish_task_counts_as_failure() {
        let fetcher = Arc::new(ScriptedFetcher::new([Ok(batch_of_sizes(&[100; 3]))]));
        let metrics = Arc::new(RecordingMetrics::new());

        let err = IngestionCycle::new(fetcher, Arc::new(PanickingPublisher), EnvelopeFields::new("Incoming Data"))
            .with_reporter(MetricsReporter::new(metrics.clone()))
            .with_on_failure(OnFailure::Escalate)
            .run()
            .await
            .unwrap_err();

        match err {
            CycleError::Publish { failed, total, source } => {
                assert_eq!((failed, total), (1, 1));
                assert_eq!(source.kind(), ErrorKind::Io);
                assert!(source.message().contains("publish task aborted"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(metrics.observations(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_run_concurrently() {
        let fetcher = Arc::new(ScriptedFetcher::new([Ok(batch_of_sizes(&[500; 8]))]));
        let publisher = Arc::new(RecordingPublisher::new().with_delay(Duration::from_millis(100)));
        let metrics = Arc::new(RecordingMetrics::new());

        let started = tokio::time::Instant::now();
        let report = cycle(&fetcher, &publisher, &metrics)
            .with_max_envelope_size(1_100)
            .run()
            .await
            .unwrap();

        assert!(report.envelopes >= 4);
        assert!(publisher.max_in_flight() > 1);
        assert!(started.elapsed() < Duration::from_millis(100) * report.envelopes as u32);
    }
}
