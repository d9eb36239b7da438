use ingest_api::IngestError;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("{0}")]
    Cycle(#[from] ingest_engine::CycleError),

    #[error("feed client: {0}")]
    Fetcher(#[source] IngestError),

    #[error("signal: {0}")]
    Signal(#[from] std::io::Error),
}
