use std::sync::Arc;

use crate::IngestError;
use crate::size::{detail_json, entry_size};

// ════════════════════════════════════════════════════════════════
//  Record / RecordBatch
// ════════════════════════════════════════════════════════════════

/// Одна запись из upstream feed'а (одна транзакция).
///
/// Непрозрачна для воркера: хранится как компактный JSON-текст,
/// идентичности кроме содержимого нет. Неизменяема после fetch.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Record {
    json: String,
}

impl Record {
    pub fn from_value(value: &serde_json::Value) -> Result<Self, IngestError> {
        Ok(Self { json: serde_json::to_string(value)? })
    }

    /// Распарсить JSON-текст и нормализовать его в компактную форму.
    pub fn parse(text: &str) -> Result<Self, IngestError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    pub fn as_json(&self) -> &str {
        &self.json
    }

    /// Длина сериализованной записи в байтах.
    pub fn len(&self) -> usize {
        self.json.len()
    }

    pub fn is_empty(&self) -> bool {
        self.json.is_empty()
    }
}

/// Упорядоченная пачка записей одного fetch'а. Живёт один cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordBatch {
    records: Vec<Record>,
}

impl RecordBatch {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

impl FromIterator<Record> for RecordBatch {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self { records: iter.into_iter().collect() }
    }
}

// ════════════════════════════════════════════════════════════════
//  Envelope
// ════════════════════════════════════════════════════════════════

pub const DEFAULT_SOURCE: &str = "Fargate Ingestion Worker";

/// Фиксированные метаданные envelope'а: одинаковы для всех envelope'ов цикла.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvelopeFields {
    pub source: String,
    pub detail_type: String,
    pub resources: Vec<String>,
    /// Прикладывается ли timestamp к entry (влияет на размер).
    pub with_timestamp: bool,
}

impl EnvelopeFields {
    pub fn new(detail_type: impl Into<String>) -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            detail_type: detail_type.into(),
            resources: Vec::new(),
            with_timestamp: false,
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resources.push(resource.into());
        self
    }

    pub fn with_timestamp(mut self, on: bool) -> Self {
        self.with_timestamp = on;
        self
    }

    /// Тот же набор метаданных с другим detail-type (health check).
    pub fn for_detail_type(&self, detail_type: impl Into<String>) -> Self {
        Self { detail_type: detail_type.into(), ..self.clone() }
    }
}

/// Транспортная единица для шины: метаданные + `{"txs":[...]}`.
///
/// Всегда содержит ≥1 запись. Собирается только packer'ом,
/// после чего publisher лишь читает её.
#[derive(Clone, Debug)]
pub struct Envelope {
    fields: Arc<EnvelopeFields>,
    records: Vec<Record>,
    detail: String,
    size: usize,
}

impl Envelope {
    /// Собрать envelope из записей. Размер считается по готовому detail'у.
    pub fn assemble(fields: Arc<EnvelopeFields>, records: Vec<Record>) -> Self {
        let detail = detail_json(&records);
        let size = entry_size(&fields, Some(&detail));
        Self { fields, records, detail, size }
    }

    pub fn fields(&self) -> &EnvelopeFields {
        &self.fields
    }

    pub fn source(&self) -> &str {
        &self.fields.source
    }

    pub fn detail_type(&self) -> &str {
        &self.fields.detail_type
    }

    pub fn resources(&self) -> &[String] {
        &self.fields.resources
    }

    pub fn has_timestamp(&self) -> bool {
        self.fields.with_timestamp
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Размер entry в wire-формате шины.
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Запись, которая не влезает даже в одиночный envelope.
///
/// Не ошибка: окончательное решение выбросить, без ретраев.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscardedRecord {
    /// Позиция в исходном batch'е.
    pub index: usize,
    /// Размер одиночного envelope'а с этой записью.
    pub solo_size: usize,
}
