use std::future::Future;
use std::pin::Pin;

use crate::{Envelope, IngestError, RecordBatch};

// ════════════════════════════════════════════════════════════════
//  Collaborator Traits
// ════════════════════════════════════════════════════════════════

/// Источник записей: один вызов = одна свежая пачка из upstream feed'а.
///
/// Реализации: HTTP feed (binary crate), in-memory fakes в тестах.
/// Ретраев внутри нет — следующий тик планировщика и есть ретрай.
pub trait RecordFetcher: Send + Sync {
    fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<RecordBatch, IngestError>> + Send + '_>>;
}

/// Отправка одного envelope'а в шину (один outbound вызов на envelope).
///
/// Publisher не мутирует и не удерживает envelope — он владеет
/// только исходом доставки.
pub trait EnvelopePublisher: Send + Sync {
    fn publish<'a>(
        &'a self,
        envelope: &'a Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), IngestError>> + Send + 'a>>;
}

/// Приёмник агрегированной метрики "bytes ingested" (одно наблюдение за цикл).
pub trait MetricsSink: Send + Sync {
    fn put_ingested_bytes(&self, total_bytes: u64)
        -> Pin<Box<dyn Future<Output = Result<(), IngestError>> + Send + '_>>;
}
