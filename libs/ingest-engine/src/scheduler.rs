use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::cycle::IngestionCycle;

/// Счётчики работы планировщика за всё время `run()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Запущено циклов.
    pub started: u64,
    /// Тиков пропущено, потому что предыдущий цикл ещё не завершился.
    pub skipped: u64,
}

/// Запускает `IngestionCycle` на каждом тике фиксированного интервала.
///
/// Не больше одного активного цикла: слот `in_flight` занимается на всё
/// время цикла, тик при занятом слоте пропускается (не ставится в очередь).
pub struct CycleScheduler {
    cycle: Arc<IngestionCycle>,
    interval: Duration,
    in_flight: Arc<Mutex<()>>,
}

impl CycleScheduler {
    pub fn new(cycle: IngestionCycle, interval: Duration) -> Self {
        Self {
            cycle: Arc::new(cycle),
            // tokio::time::interval паникует на нулевом периоде
            interval: interval.max(Duration::from_millis(1)),
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    /// Крутить тики до отмены `token`. Активный цикл не прерывается:
    /// после отмены `run()` дожидается его завершения.
    pub async fn run(self, token: CancellationToken) -> SchedulerStats {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let tracker = TaskTracker::new();
        let mut stats = SchedulerStats::default();

        tracing::info!(interval_ms = self.interval.as_millis() as u64, "scheduler started");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let Ok(slot) = self.in_flight.clone().try_lock_owned() else {
                        stats.skipped += 1;
                        tracing::warn!(skipped = stats.skipped, "previous cycle still in flight, skipping tick");
                        continue;
                    };

                    stats.started += 1;
                    let cycle = self.cycle.clone();
                    let span = tracing::info_span!("cycle", n = stats.started);
                    tracker.spawn(
                        async move {
                            let _slot = slot;
                            if let Err(e) = cycle.run().await {
                                tracing::error!(error = %e, "cycle failed");
                            }
                        }
                        .instrument(span),
                    );
                }
            }
        }

        tracker.close();
        tracker.wait().await;
        tracing::info!(started = stats.started, skipped = stats.skipped, "scheduler stopped");
        stats
    }
}
