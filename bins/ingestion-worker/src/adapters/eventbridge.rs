use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, SystemTime};

use aws_config::timeout::TimeoutConfig;
use aws_sdk_eventbridge::Client;
use aws_sdk_eventbridge::error::{DisplayErrorContext, SdkError};
use aws_sdk_eventbridge::primitives::DateTime;
use aws_sdk_eventbridge::types::{PutEventsRequestEntry, PutEventsResultEntry};

use ingest_api::{Envelope, EnvelopePublisher, IngestError};

/// `EnvelopePublisher` поверх EventBridge: один `PutEvents` на envelope.
pub struct EventBridgePublisher {
    client: Client,
    bus_name: String,
}

impl EventBridgePublisher {
    /// Клиент из стандартной цепочки AWS (env, профиль, роль задачи).
    /// `timeout` ограничивает весь `PutEvents`, включая ретраи SDK.
    pub async fn from_env(bus_name: impl Into<String>, timeout: Duration) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .timeout_config(TimeoutConfig::builder().operation_timeout(timeout).build())
            .load()
            .await;
        Self { client: Client::new(&config), bus_name: bus_name.into() }
    }

    async fn put(&self, envelope: &Envelope) -> Result<(), IngestError> {
        let entry = request_entry(&self.bus_name, envelope, SystemTime::now());
        let output = self
            .client
            .put_events()
            .entries(entry)
            .send()
            .await
            .map_err(|e| {
                let detail = format!("PutEvents: {}", DisplayErrorContext(&e));
                match e {
                    SdkError::TimeoutError(_) => IngestError::timeout(detail),
                    _ => IngestError::io(detail),
                }
            })?;
        check_results(output.entries())
    }
}

impl EnvelopePublisher for EventBridgePublisher {
    fn publish<'a>(
        &'a self,
        envelope: &'a Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), IngestError>> + Send + 'a>> {
        Box::pin(self.put(envelope))
    }
}

fn request_entry(bus_name: &str, envelope: &Envelope, now: SystemTime) -> PutEventsRequestEntry {
    let resources = (!envelope.resources().is_empty()).then(|| envelope.resources().to_vec());
    let mut builder = PutEventsRequestEntry::builder()
        .event_bus_name(bus_name)
        .source(envelope.source())
        .detail_type(envelope.detail_type())
        .detail(envelope.detail())
        .set_resources(resources);
    if envelope.has_timestamp() {
        builder = builder.time(DateTime::from(now));
    }
    builder.build()
}

/// Шина принимает запрос целиком, но может отклонить отдельную entry.
fn check_results(entries: &[PutEventsResultEntry]) -> Result<(), IngestError> {
    match entries.iter().find_map(|e| e.error_code().map(|code| (code, e.error_message()))) {
        Some((code, message)) => Err(IngestError::rejected(format!(
            "entry rejected: {code}: {}",
            message.unwrap_or("no message")
        ))),
        None => Ok(()),
    }
}
