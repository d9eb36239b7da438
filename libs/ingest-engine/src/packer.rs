use std::sync::Arc;

use ingest_api::size::{detail_size, entry_size};
use ingest_api::{DiscardedRecord, Envelope, EnvelopeFields, Record};

// ═══════════════════════════════════════════════════════════════
//  Pack outcome
// ═══════════════════════════════════════════════════════════════

/// Результат упаковки одного batch'а.
#[derive(Debug, Default)]
pub struct PackOutcome {
    /// Envelope'ы в порядке входных записей.
    pub envelopes: Vec<Envelope>,
    /// Записи, не влезающие даже в одиночный envelope.
    pub discarded: Vec<DiscardedRecord>,
}

impl PackOutcome {
    /// Сумма размеров всех envelope'ов.
    pub fn total_size(&self) -> usize {
        self.envelopes.iter().map(Envelope::size).sum()
    }

    pub fn record_count(&self) -> usize {
        self.envelopes.iter().map(|e| e.records().len()).sum()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Candidate — локальное состояние прохода
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
struct Candidate {
    records: Vec<Record>,
    /// Сумма длин сериализованных записей.
    bytes: usize,
}

impl Candidate {
    fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Размер envelope'а, если добавить `record` к текущему кандидату.
    fn size_with(&self, fixed: usize, record: &Record) -> usize {
        fixed + detail_size(self.bytes + record.len(), self.records.len() + 1)
    }

    fn push(&mut self, record: Record) {
        self.bytes += record.len();
        self.records.push(record);
    }

    fn take(&mut self) -> Vec<Record> {
        self.bytes = 0;
        std::mem::take(&mut self.records)
    }
}

// ═══════════════════════════════════════════════════════════════
//  pack
// ═══════════════════════════════════════════════════════════════

/// Разбить упорядоченные записи на envelope'ы размером ≤ `max_size`.
///
/// Один проход слева направо, жадно, с сохранением порядка:
/// - запись помещается в текущий кандидат → добавляем;
/// - не помещается и кандидат не пуст → flush кандидата, запись
///   начинает новый кандидат (и заново проверяется одна);
/// - не помещается даже одна → `DiscardedRecord`, кандидат остаётся пустым.
///
/// Жадность намеренная: оптимальный bin-packing не сохранил бы порядок.
/// Размер кандидата считается инкрементально, detail собирается
/// только при flush.
pub fn pack<I>(records: I, fields: &Arc<EnvelopeFields>, max_size: usize) -> PackOutcome
where
    I: IntoIterator<Item = Record>,
{
    let fixed = entry_size(fields, None);
    let mut candidate = Candidate::default();
    let mut outcome = PackOutcome::default();

    for (index, record) in records.into_iter().enumerate() {
        if !candidate.is_empty() && candidate.size_with(fixed, &record) > max_size {
            flush(&mut outcome, fields, candidate.take());
        }

        let size = candidate.size_with(fixed, &record);
        if size <= max_size {
            candidate.push(record);
        } else {
            tracing::warn!(
                index,
                size,
                max_size,
                "discarding record: does not fit into a single envelope"
            );
            outcome.discarded.push(DiscardedRecord { index, solo_size: size });
        }
    }

    if !candidate.is_empty() {
        flush(&mut outcome, fields, candidate.take());
    }

    outcome
}

fn flush(outcome: &mut PackOutcome, fields: &Arc<EnvelopeFields>, records: Vec<Record>) {
    let envelope = Envelope::assemble(fields.clone(), records);
    tracing::debug!(
        envelope = outcome.envelopes.len() + 1,
        records = envelope.records().len(),
        size = envelope.size(),
        "envelope packed"
    );
    outcome.envelopes.push(envelope);
}
