//! Latest-Value Telemetry State
//!
//! One shared snapshot of the polled parameters. Each decoded reading
//! overwrites its own field under the write lock; the publisher copies the
//! whole snapshot under the read lock. Fields from different poll rounds may
//! be published together.

use crate::pid::{ParameterKind, Reading};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// Latest known value of each parameter
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Engine coolant temperature (°C)
    pub coolant_temp: f64,
    /// Engine speed (rev/min)
    pub rpm: f64,
    /// Mass air flow
    pub maf: f64,
}

impl TelemetrySnapshot {
    /// Get the field for a parameter
    pub fn get(&self, kind: ParameterKind) -> f64 {
        match kind {
            ParameterKind::CoolantTemp => self.coolant_temp,
            ParameterKind::Rpm => self.rpm,
            ParameterKind::Maf => self.maf,
        }
    }

    fn set(&mut self, kind: ParameterKind, value: f64) {
        match kind {
            ParameterKind::CoolantTemp => self.coolant_temp = value,
            ParameterKind::Rpm => self.rpm = value,
            ParameterKind::Maf => self.maf = value,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    snapshot: TelemetrySnapshot,
    /// Parameters that have received at least one valid decode
    known: [bool; 3],
}

fn slot(kind: ParameterKind) -> usize {
    match kind {
        ParameterKind::CoolantTemp => 0,
        ParameterKind::Rpm => 1,
        ParameterKind::Maf => 2,
    }
}

/// Shared handle to the telemetry snapshot
#[derive(Debug, Clone, Default)]
pub struct TelemetryState {
    inner: Arc<RwLock<Inner>>,
}

impl TelemetryState {
    /// Create a state with every field at 0.0 and unknown
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a decoded reading; only its own field changes
    pub fn apply(&self, reading: Reading) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.snapshot.set(reading.kind, reading.value);
        inner.known[slot(reading.kind)] = true;
    }

    /// Copy of the whole snapshot
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot
    }

    /// Whether a parameter has been decoded at least once
    pub fn is_known(&self, kind: ParameterKind) -> bool {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).known[slot(kind)]
    }

    /// Latest value of a parameter, `None` until its first decode
    pub fn value(&self, kind: ParameterKind) -> Option<f64> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.known[slot(kind)].then(|| inner.snapshot.get(kind))
    }
}
