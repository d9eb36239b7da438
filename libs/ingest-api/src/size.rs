//! Размер entry в wire-формате шины (PutEvents entry size).
//!
//! Считается так же, как шина считает лимит: 14 байт за timestamp,
//! UTF-8 длины source / detail-type / detail и всех resource-строк.

use crate::{EnvelopeFields, Record};

/// Фиксированная стоимость timestamp'а, если он прикладывается к entry.
pub const TIMESTAMP_SIZE: usize = 14;

/// Жёсткий лимит шины на один entry (256 KiB).
pub const TRANSPORT_HARD_CAP: usize = 256 * 1024;

/// Рабочий лимит с запасом под TRANSPORT_HARD_CAP.
pub const MAX_ENVELOPE_SIZE: usize = 256_000;

pub const DETAIL_PREFIX: &str = r#"{"txs":["#;
pub const DETAIL_SUFFIX: &str = "]}";

/// Размер entry: метаданные + (опционально) сериализованный detail.
///
/// Чистая функция, без I/O.
pub fn entry_size(fields: &EnvelopeFields, detail: Option<&str>) -> usize {
    let mut size = 0;
    if fields.with_timestamp {
        size += TIMESTAMP_SIZE;
    }
    size += fields.source.len();
    size += fields.detail_type.len();
    if let Some(detail) = detail {
        size += detail.len();
    }
    size += fields.resources.iter().map(String::len).sum::<usize>();
    size
}

/// Длина `{"txs":[r1,r2,...]}` для `count` записей суммарной длины `record_bytes`,
/// без сборки самой строки.
pub fn detail_size(record_bytes: usize, count: usize) -> usize {
    DETAIL_PREFIX.len() + record_bytes + count.saturating_sub(1) + DETAIL_SUFFIX.len()
}

/// Собрать detail payload: `{"txs":[...]}` в компактном JSON.
pub fn detail_json<'a>(records: impl IntoIterator<Item = &'a Record>) -> String {
    let mut out = String::from(DETAIL_PREFIX);
    for (i, record) in records.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(record.as_json());
    }
    out.push_str(DETAIL_SUFFIX);
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fields() -> EnvelopeFields {
        EnvelopeFields::new("Incoming Data")
    }

    #[test]
    fn metadata_only() {
        let f = fields();
        assert_eq!(
            entry_size(&f, None),
            "Fargate Ingestion Worker".len() + "Incoming Data".len()
        );
    }

    #[test]
    fn timestamp_adds_fourteen_bytes() {
        let plain = fields();
        let stamped = fields().with_timestamp(true);
        assert_eq!(entry_size(&stamped, None) - entry_size(&plain, None), 14);
    }

    #[test]
    fn resources_are_summed() {
        let f = fields()
            .with_resource("arn:aws:kinesis:eu-west-1:1:stream/a")
            .with_resource("xyz");
        let base = entry_size(&fields(), Some("{}"));
        assert_eq!(
            entry_size(&f, Some("{}")),
            base + "arn:aws:kinesis:eu-west-1:1:stream/a".len() + 3
        );
    }

    #[test]
    fn counts_utf8_bytes_not_chars() {
        let f = EnvelopeFields::new("Données");
        assert_eq!(entry_size(&f, Some("é")), f.source.len() + 8 + 2);
    }

    #[test]
    fn detail_size_matches_built_json() {
        let records: Vec<Record> = (0..5)
            .map(|i| Record::from_value(&json!({ "hash": format!("h{i}"), "size": i })).unwrap())
            .collect();
        for n in 0..=records.len() {
            let slice = &records[..n];
            let bytes: usize = slice.iter().map(Record::len).sum();
            let built = detail_json(slice);
            assert_eq!(detail_size(bytes, n), built.len());
            let parsed: serde_json::Value = serde_json::from_str(&built).unwrap();
            assert_eq!(parsed["txs"].as_array().unwrap().len(), n);
        }
    }
}
