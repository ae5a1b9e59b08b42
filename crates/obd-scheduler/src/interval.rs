//! Runtime-Reconfigurable Poll Interval
//!
//! Both periodic tasks read the interval after every tick, so an update is
//! picked up on the next cycle without restarting anything. A task already
//! sleeping on the previous value finishes that sleep first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Interval used until the first remote update (seconds)
pub const DEFAULT_INTERVAL_SECS: f64 = 5.0;

/// Rejected interval updates
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Invalid poll interval {0}: must be a positive number of seconds")]
    InvalidInterval(f64),
}

/// Accept only intervals that give a non-zero, representable sleep
fn validate(seconds: f64) -> Result<f64, ConfigError> {
    if matches!(Duration::try_from_secs_f64(seconds), Ok(d) if !d.is_zero()) {
        Ok(seconds)
    } else {
        Err(ConfigError::InvalidInterval(seconds))
    }
}

/// Shared handle to the poll/publish interval
#[derive(Debug, Clone)]
pub struct PollInterval {
    /// `f64` bits, swapped atomically
    bits: Arc<AtomicU64>,
}

impl PollInterval {
    /// Create an interval, rejecting non-positive values
    pub fn new(seconds: f64) -> Result<Self, ConfigError> {
        let seconds = validate(seconds)?;
        Ok(Self {
            bits: Arc::new(AtomicU64::new(seconds.to_bits())),
        })
    }

    /// Current interval in seconds
    pub fn seconds(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Current interval as a sleep duration
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.seconds())
    }

    /// Replace the interval for every holder of this handle.
    ///
    /// Invalid values leave the previous interval in effect. Returns the
    /// interval that was replaced.
    pub fn apply_interval(&self, seconds: f64) -> Result<f64, ConfigError> {
        let seconds = validate(seconds).map_err(|e| {
            warn!("{}; keeping {}s", e, self.seconds());
            e
        })?;
        let previous = f64::from_bits(self.bits.swap(seconds.to_bits(), Ordering::AcqRel));
        info!("Poll interval changed from {}s to {}s", previous, seconds);
        Ok(previous)
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(DEFAULT_INTERVAL_SECS.to_bits())),
        }
    }
}
