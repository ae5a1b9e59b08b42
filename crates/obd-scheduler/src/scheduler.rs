//! OBD-II Poll Scheduler
//!
//! Each round requests every catalogued PID in order, with a guard delay
//! after each request so the ECU is never handed back-to-back queries.

use crate::periodic::Periodic;
use obd_protocol::{BusChannel, ParameterKind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default spacing between consecutive requests
pub const DEFAULT_GUARD_DELAY: Duration = Duration::from_millis(20);

/// Configuration for the poll scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay after each request frame
    pub guard_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            guard_delay: DEFAULT_GUARD_DELAY,
        }
    }
}

/// Outcome of a single poll round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub sent: usize,
    pub failed: usize,
}

/// Running totals for the scheduler
#[derive(Debug, Default)]
pub struct PollStats {
    pub rounds: AtomicU64,
    pub frames_sent: AtomicU64,
    pub send_failures: AtomicU64,
}

/// Sends the PID request round on every tick
pub struct PollScheduler<B: BusChannel> {
    bus: Arc<B>,
    config: SchedulerConfig,
    stats: Arc<PollStats>,
}

impl<B: BusChannel> PollScheduler<B> {
    /// Create a scheduler polling over `bus`
    pub fn new(bus: Arc<B>, config: SchedulerConfig) -> Self {
        Self {
            bus,
            config,
            stats: Arc::new(PollStats::default()),
        }
    }

    /// Shared handle to the scheduler's counters
    pub fn stats(&self) -> Arc<PollStats> {
        Arc::clone(&self.stats)
    }

    /// Request every catalogued PID once.
    ///
    /// A failed send is logged and the rest of the round still goes out.
    pub async fn poll_round(&mut self) -> RoundReport {
        let mut report = RoundReport::default();

        for kind in ParameterKind::ALL {
            match self.bus.send(kind.request_frame()).await {
                Ok(()) => {
                    report.sent += 1;
                    debug!("Requested {} on {}", kind, self.bus.name());
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("Request for {} on {} not sent: {}", kind, self.bus.name(), e);
                }
            }
            tokio::time::sleep(self.config.guard_delay).await;
        }

        self.stats.rounds.fetch_add(1, Ordering::Relaxed);
        self.stats
            .frames_sent
            .fetch_add(report.sent as u64, Ordering::Relaxed);
        self.stats
            .send_failures
            .fetch_add(report.failed as u64, Ordering::Relaxed);
        metrics::counter!("obd_frames_sent_total").increment(report.sent as u64);
        metrics::counter!("obd_send_failures_total").increment(report.failed as u64);

        report
    }
}

impl<B: BusChannel> Periodic for PollScheduler<B> {
    fn name(&self) -> &'static str {
        "poll scheduler"
    }

    async fn tick(&mut self) {
        self.poll_round().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::{default_filters, LoopbackBus};

    fn scheduler() -> (PollScheduler<LoopbackBus>, Arc<LoopbackBus>) {
        let bus = Arc::new(LoopbackBus::new("test0", default_filters()));
        (
            PollScheduler::new(Arc::clone(&bus), SchedulerConfig::default()),
            bus,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_sends_catalogue_in_order() {
        let (mut scheduler, bus) = scheduler();
        let start = tokio::time::Instant::now();

        let report = scheduler.poll_round().await;

        assert_eq!(report, RoundReport { sent: 3, failed: 0 });
        let expected: Vec<_> = ParameterKind::ALL.iter().map(|k| k.request_frame()).collect();
        assert_eq!(bus.sent_frames(), expected);
        assert_eq!(start.elapsed(), DEFAULT_GUARD_DELAY * 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_does_not_abort_round() {
        let (mut scheduler, bus) = scheduler();
        bus.fail_next_sends(1);

        let report = scheduler.poll_round().await;

        assert_eq!(report, RoundReport { sent: 2, failed: 1 });
        let pids: Vec<u8> = bus.sent_frames().iter().map(|f| f.data()[2]).collect();
        assert_eq!(pids, vec![0x0C, 0x10]);

        let stats = scheduler.stats();
        assert_eq!(stats.rounds.load(Ordering::Relaxed), 1);
        assert_eq!(stats.frames_sent.load(Ordering::Relaxed), 2);
        assert_eq!(stats.send_failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_request_fails() {
        let (mut scheduler, bus) = scheduler();
        bus.fail_next_sends(3);
        assert_eq!(scheduler.poll_round().await, RoundReport { sent: 0, failed: 3 });
        assert_eq!(scheduler.poll_round().await, RoundReport { sent: 3, failed: 0 });
    }
}
