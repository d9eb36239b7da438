use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Value, json};

use ingest_api::{IngestError, MetricsSink};

pub const NAMESPACE: &str = "DataIngestionPipeline";
pub const METRIC_NAME: &str = "IngestedDataSize";

/// `MetricsSink`, пишущий CloudWatch Embedded Metric Format: одна JSON-строка
/// на наблюдение. Лог-драйвер контейнера превращает её в метрику.
///
/// Запись блокирующая, поэтому уходит в `spawn_blocking`.
pub struct EmfMetricsSink {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl EmfMetricsSink {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self { out: Arc::new(Mutex::new(Box::new(out))) }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

fn write_line(out: &Mutex<Box<dyn Write + Send>>, total_bytes: u64) -> Result<(), IngestError> {
    let timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    let line = emf_document(total_bytes, timestamp_ms);

    let mut out = out.lock().map_err(|_| IngestError::io("metrics writer lock poisoned"))?;
    writeln!(out, "{line}")?;
    out.flush()?;
    Ok(())
}

impl MetricsSink for EmfMetricsSink {
    fn put_ingested_bytes(
        &self,
        total_bytes: u64,
    ) -> Pin<Box<dyn Future<Output = Result<(), IngestError>> + Send + '_>> {
        let out = self.out.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || write_line(&out, total_bytes))
                .await
                .map_err(|e| IngestError::io(format!("metrics writer task: {e}")))?
        })
    }
}

fn emf_document(total_bytes: u64, timestamp_ms: u64) -> Value {
    json!({
        "_aws": {
            "Timestamp": timestamp_ms,
            "CloudWatchMetrics": [{
                "Namespace": NAMESPACE,
                "Dimensions": [["IngestedData"]],
                "Metrics": [{ "Name": METRIC_NAME, "Unit": "Bytes" }],
            }],
        },
        "IngestedData": "Size",
        METRIC_NAME: total_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn document_declares_metric_and_dimension() {
        let doc = emf_document(1219, 1_700_000_000_000);

        assert_eq!(doc["IngestedDataSize"], 1219);
        assert_eq!(doc["IngestedData"], "Size");
        assert_eq!(doc["_aws"]["Timestamp"], 1_700_000_000_000u64);
        let directive = &doc["_aws"]["CloudWatchMetrics"][0];
        assert_eq!(directive["Namespace"], "DataIngestionPipeline");
        assert_eq!(directive["Dimensions"][0][0], "IngestedData");
        assert_eq!(directive["Metrics"][0]["Name"], "IngestedDataSize");
        assert_eq!(directive["Metrics"][0]["Unit"], "Bytes");
    }

    #[tokio::test]
    async fn one_json_line_per_observation() {
        let buf = SharedBuf::default();
        let sink = EmfMetricsSink::new(buf.clone());

        sink.put_ingested_bytes(10).await.unwrap();
        sink.put_ingested_bytes(0).await.unwrap();

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let values: Vec<u64> = text
            .lines()
            .map(|l| serde_json::from_str::<Value>(l).unwrap()["IngestedDataSize"].as_u64().unwrap())
            .collect();
        assert_eq!(values, vec![10, 0]);
    }

    #[tokio::test]
    async fn write_failure_is_io_error() {
        let sink = EmfMetricsSink::new(BrokenPipe);
        let err = sink.put_ingested_bytes(5).await.unwrap_err();
        assert_eq!(err.kind(), ingest_api::ErrorKind::Io);
    }

    struct SlowPipe(std::time::Duration);

    impl Write for SlowPipe {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            std::thread::sleep(self.0);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn slow_writer_does_not_block_the_runtime() {
        use std::time::{Duration, Instant};

        let sink = Arc::new(EmfMetricsSink::new(SlowPipe(Duration::from_millis(300))));
        let write = tokio::spawn({
            let sink = sink.clone();
            async move { sink.put_ingested_bytes(1).await }
        });

        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(started.elapsed() < Duration::from_millis(250), "runtime stalled for {:?}", started.elapsed());
        assert!(!write.is_finished());

        write.await.unwrap().unwrap();
    }
}
