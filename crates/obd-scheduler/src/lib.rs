//! OBD-II Poll Scheduling
//!
//! The shared poll interval, the periodic task runner both the poller and the
//! publisher are driven by, and the PID request round itself.

mod interval;
mod periodic;
mod scheduler;

pub use interval::{ConfigError, PollInterval, DEFAULT_INTERVAL_SECS};
pub use periodic::{Periodic, PeriodicTask};
pub use scheduler::{PollScheduler, PollStats, RoundReport, SchedulerConfig, DEFAULT_GUARD_DELAY};
