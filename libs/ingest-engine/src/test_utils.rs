//! In-memory коллабораторы для тестов цикла, планировщика и health probe.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use ingest_api::{
    Envelope, EnvelopePublisher, IngestError, MetricsSink, Record, RecordBatch, RecordFetcher,
};

/// Запись, сериализующаяся ровно в `len` байт (JSON-строка из `x`).
pub fn record_of_len(len: usize) -> Record {
    let text = format!("\"{}\"", "x".repeat(len.saturating_sub(2)));
    Record::parse(&text).expect("quoted ascii is valid json")
}

pub fn batch_of_sizes(sizes: &[usize]) -> RecordBatch {
    sizes.iter().map(|&len| record_of_len(len)).collect()
}

/// Счётчик одновременно активных вызовов с запоминанием максимума.
#[derive(Default)]
struct InFlight {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

// ═══════════════════════════════════════════════════════════════
//  ScriptedFetcher
// ═══════════════════════════════════════════════════════════════

/// Отдаёт заранее заданные ответы по очереди; когда очередь пуста —
/// пустой batch.
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<RecordBatch, IngestError>>>,
    delay: Duration,
    calls: AtomicUsize,
    completed: AtomicUsize,
    in_flight: InFlight,
}

impl ScriptedFetcher {
    pub fn new(script: impl IntoIterator<Item = Result<RecordBatch, IngestError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            in_flight: InFlight::default(),
        }
    }

    /// Каждый fetch "висит" `delay` перед ответом.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.in_flight.max.load(Ordering::SeqCst)
    }
}

impl RecordFetcher for ScriptedFetcher {
    fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<RecordBatch, IngestError>> + Send + '_>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.in_flight.enter();
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self
                .script
                .lock()
                .expect("script lock")
                .pop_front()
                .unwrap_or_else(|| Ok(RecordBatch::default()));
            self.in_flight.exit();
            self.completed.fetch_add(1, Ordering::SeqCst);
            next
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  RecordingPublisher
// ═══════════════════════════════════════════════════════════════

type FailurePredicate = Box<dyn Fn(usize, &Envelope) -> bool + Send + Sync>;

/// Запоминает успешно отправленные envelope'ы. Попытка `n` (с нуля)
/// отклоняется, если предикат вернул `true`.
pub struct RecordingPublisher {
    published: Mutex<Vec<Envelope>>,
    attempts: AtomicUsize,
    fail_when: Option<FailurePredicate>,
    delay: Duration,
    in_flight: InFlight,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail_when: None,
            delay: Duration::ZERO,
            in_flight: InFlight::default(),
        }
    }

    pub fn failing_when(predicate: impl Fn(usize, &Envelope) -> bool + Send + Sync + 'static) -> Self {
        Self { fail_when: Some(Box::new(predicate)), ..Self::new() }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn published(&self) -> Vec<Envelope> {
        self.published.lock().expect("published lock").clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.in_flight.max.load(Ordering::SeqCst)
    }
}

impl Default for RecordingPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvelopePublisher for RecordingPublisher {
    fn publish<'a>(
        &'a self,
        envelope: &'a Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), IngestError>> + Send + 'a>> {
        Box::pin(async move {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            self.in_flight.enter();
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.exit();

            if self.fail_when.as_ref().is_some_and(|fail| fail(attempt, envelope)) {
                return Err(IngestError::rejected(format!("attempt {attempt} rejected")));
            }
            self.published.lock().expect("published lock").push(envelope.clone());
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  RecordingMetrics
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct RecordingMetrics {
    observations: Mutex<Vec<u64>>,
    attempts: AtomicUsize,
    fail: bool,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Каждая попытка эмиссии завершается ошибкой.
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn observations(&self) -> Vec<u64> {
        self.observations.lock().expect("observations lock").clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl MetricsSink for RecordingMetrics {
    fn put_ingested_bytes(
        &self,
        total_bytes: u64,
    ) -> Pin<Box<dyn Future<Output = Result<(), IngestError>> + Send + '_>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(IngestError::io("metrics endpoint unavailable"));
            }
            self.observations.lock().expect("observations lock").push(total_bytes);
            Ok(())
        })
    }
}
