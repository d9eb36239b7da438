use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;

use ingest_api::{IngestError, Record, RecordBatch, RecordFetcher};

/// Тело ответа feed'а: интересует только массив `txs`.
#[derive(Deserialize)]
struct FeedPage {
    txs: Vec<serde_json::Value>,
}

/// `RecordFetcher` поверх HTTP GET; одна транзакция из `txs` = одна запись.
pub struct HttpFeedFetcher {
    http: reqwest::Client,
    url: String,
}

impl HttpFeedFetcher {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, IngestError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::config(format!("HTTP client: {e}")))?;
        Ok(Self { http, url: url.to_string() })
    }

    async fn get(&self) -> Result<RecordBatch, IngestError> {
        let resp = self.http.get(&self.url).send().await.map_err(request_error)?;

        let status = resp.status();
        let body = resp.text().await.map_err(request_error)?;

        if !status.is_success() {
            return Err(IngestError::io(format!("feed responded {status}: {}", excerpt(&body))));
        }
        parse_feed(&body)
    }
}

impl RecordFetcher for HttpFeedFetcher {
    fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<RecordBatch, IngestError>> + Send + '_>> {
        Box::pin(self.get())
    }
}

/// Разобрать тело `{ "txs": [...] }` в batch; порядок сохраняется.
pub fn parse_feed(body: &str) -> Result<RecordBatch, IngestError> {
    let page: FeedPage = serde_json::from_str(body)?;
    page.txs.iter().map(Record::from_value).collect::<Result<Vec<_>, _>>().map(RecordBatch::new)
}

fn request_error(e: reqwest::Error) -> IngestError {
    if e.is_timeout() {
        IngestError::timeout(format!("feed request: {e}"))
    } else {
        IngestError::io(format!("feed request: {e}"))
    }
}

fn excerpt(body: &str) -> &str {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}
