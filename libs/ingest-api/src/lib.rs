//! Общий словарь ingestion-воркера: записи, envelope'ы, размер entry
//! и трейты внешних коллабораторов (feed, шина, метрики).
//!
//! Без зависимости от tokio: трейты возвращают boxed futures.

pub mod error;
pub mod size;
mod traits;
mod types;

pub use error::{ErrorKind, IngestError};
pub use size::{MAX_ENVELOPE_SIZE, TRANSPORT_HARD_CAP};
pub use traits::{EnvelopePublisher, MetricsSink, RecordFetcher};
pub use types::{DEFAULT_SOURCE, DiscardedRecord, Envelope, EnvelopeFields, Record, RecordBatch};
