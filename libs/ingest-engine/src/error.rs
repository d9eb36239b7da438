use ingest_api::IngestError;

/// Ошибки цикла, которые поднимаются наверх только в режиме `OnFailure::Escalate`.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("failed to get data from the feed: {0}")]
    Fetch(#[source] IngestError),

    #[error("failed to push {failed} of {total} envelopes on the bus: {source}")]
    Publish {
        failed: usize,
        total: usize,
        #[source]
        source: IngestError,
    },
}
