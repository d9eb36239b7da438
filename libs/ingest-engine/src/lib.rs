pub mod cycle;
pub mod error;
pub mod health;
pub mod packer;
pub mod scheduler;
pub mod test_utils;

pub use cycle::{CycleReport, IngestionCycle, MetricsReporter, OnFailure};
pub use error::CycleError;
pub use health::{HEALTH_CHECK_DETAIL_TYPE, HealthProbe};
pub use packer::{PackOutcome, pack};
pub use scheduler::{CycleScheduler, SchedulerStats};
