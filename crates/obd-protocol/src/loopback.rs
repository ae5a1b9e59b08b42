//! In-Memory Bus and Simulated ECU
//!
//! `LoopbackBus` records every frame sent and delivers frames injected by the
//! caller. With a [`SimulatedEcu`] attached, each Mode 01 request for a
//! catalogued PID is answered with a single-frame response, which lets the
//! bridge run without hardware.

use crate::channel::{accepts, BusChannel, BusFilter, FRAME_BUFFER};
use crate::error::ObdError;
use crate::frame::Frame;
use crate::pid::{ParameterKind, POSITIVE_CURRENT_DATA};
use crate::{id, mode};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Answers Mode 01 requests with plausible idle-engine values
#[derive(Debug, Default)]
pub struct SimulatedEcu {
    /// Requests answered so far, drives the value jitter
    answered: AtomicU64,
}

impl SimulatedEcu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the response to a request frame, if this ECU would answer it
    pub fn respond(&self, request: &Frame) -> Option<Frame> {
        let data = request.data();
        if request.id() != id::OBD_REQUEST || data.len() < 3 || data[1] != mode::CURRENT_DATA {
            return None;
        }
        let kind = ParameterKind::from_pid(data[2])?;

        let seq = self.answered.fetch_add(1, Ordering::Relaxed);
        let mut hasher = DefaultHasher::new();
        seq.hash(&mut hasher);
        kind.pid().hash(&mut hasher);
        let hash = hasher.finish();

        let value_bytes: [u8; 2] = match kind {
            // 80-95 °C, stored as value + 40
            ParameterKind::CoolantTemp => [(120 + hash % 16) as u8, 0],
            // 750-900 rpm
            ParameterKind::Rpm => {
                let encoded = (750 + (hash % 150) as u16) * 4;
                encoded.to_be_bytes()
            }
            // 2-6 on the (A*256+B)/4 scale
            ParameterKind::Maf => {
                let encoded = 8 + (hash % 16) as u16;
                encoded.to_be_bytes()
            }
        };

        let n = kind.value_bytes();
        let mut payload = [0u8; 8];
        payload[0] = (2 + n) as u8;
        payload[1] = POSITIVE_CURRENT_DATA;
        payload[2] = kind.pid();
        payload[3..3 + n].copy_from_slice(&value_bytes[..n]);

        Some(Frame::full(id::ECU_RESPONSE, payload))
    }
}

struct Inner {
    name: String,
    filters: Vec<BusFilter>,
    inbound: broadcast::Sender<Frame>,
    sent: Mutex<Vec<Frame>>,
    failures_pending: AtomicUsize,
    ecu: Option<SimulatedEcu>,
}

/// In-memory bus channel
#[derive(Clone)]
pub struct LoopbackBus {
    inner: Arc<Inner>,
}

impl LoopbackBus {
    /// Create a loopback bus that accepts frames passing `filters`
    pub fn new(name: &str, filters: Vec<BusFilter>) -> Self {
        Self::build(name, filters, None)
    }

    /// Create a loopback bus with an ECU answering every request
    pub fn simulated(name: &str, filters: Vec<BusFilter>) -> Self {
        info!("Creating simulated OBD bus {}", name);
        Self::build(name, filters, Some(SimulatedEcu::new()))
    }

    fn build(name: &str, filters: Vec<BusFilter>, ecu: Option<SimulatedEcu>) -> Self {
        let (inbound, _) = broadcast::channel(FRAME_BUFFER);
        Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                filters,
                inbound,
                sent: Mutex::new(Vec::new()),
                failures_pending: AtomicUsize::new(0),
                ecu,
            }),
        }
    }

    /// Deliver a frame as if received from the bus.
    ///
    /// Returns false when the filter set rejects it.
    pub fn inject(&self, frame: Frame) -> bool {
        if !accepts(&self.inner.filters, frame.id()) {
            debug!("Filtered out {:?}", frame);
            return false;
        }
        // no subscribers is not an error
        let _ = self.inner.inbound.send(frame);
        true
    }

    /// Make the next `count` sends fail with a transport error
    pub fn fail_next_sends(&self, count: usize) {
        self.inner.failures_pending.store(count, Ordering::SeqCst);
    }

    /// Frames successfully written so far
    pub fn sent_frames(&self) -> Vec<Frame> {
        self.inner
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl BusChannel for LoopbackBus {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn send(&self, frame: Frame) -> Result<(), ObdError> {
        let failing = self
            .inner
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ObdError::Transport(format!(
                "{}: simulated write failure",
                self.inner.name
            )));
        }

        self.inner
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame);

        if let Some(response) = self.inner.ecu.as_ref().and_then(|ecu| ecu.respond(&frame)) {
            self.inject(response);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.inner.inbound.subscribe()
    }
}
