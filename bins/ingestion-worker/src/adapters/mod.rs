//! Реальные реализации коллабораторов цикла: HTTP feed, EventBridge, EMF.

pub mod emf;
pub mod eventbridge;
pub mod http_feed;

pub use emf::EmfMetricsSink;
pub use eventbridge::EventBridgePublisher;
pub use http_feed::HttpFeedFetcher;
