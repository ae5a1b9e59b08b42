//! Bridge Coordinator
//!
//! Owns the process-wide state (telemetry snapshot, poll interval, counters)
//! and the activities that share it:
//! - frame handler: bus delivery → decoder → telemetry state
//! - poll scheduler and publisher, each a [`PeriodicTask`]
//! - sink event handler: delivery confirmations and desired-config updates
//!
//! Sink events are handled from construction on; the bus-driven activities
//! start only once a bus channel has been opened.

use cloud_sync::{desired_interval, PublishStats, Publisher, SinkEvent, TelemetrySink};
use obd_protocol::{decode, BusChannel, Frame, Reading, TelemetryState};
use obd_scheduler::{PeriodicTask, PollInterval, PollScheduler, PollStats, SchedulerConfig};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeStatus {
    /// Waiting for a bus; nothing is polled or published
    Initializing,
    /// Polling and publishing
    Running,
}

/// Options for the bus-driven activities
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub scheduler: SchedulerConfig,
    /// Delay between bus start-up and the first publish
    pub warmup: Duration,
    /// Output name passed to the sink
    pub output: String,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            warmup: cloud_sync::WARMUP_DELAY,
            output: cloud_sync::DEFAULT_OUTPUT.to_string(),
        }
    }
}

/// Counters for the inbound path and config updates
#[derive(Debug, Default)]
pub struct BridgeStats {
    pub frames_received: AtomicU64,
    pub readings_decoded: AtomicU64,
    pub frames_ignored: AtomicU64,
    pub frames_lost: AtomicU64,
    pub config_applied: AtomicU64,
    pub config_rejected: AtomicU64,
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeSummary {
    pub poll_rounds: u64,
    pub frames_sent: u64,
    pub send_failures: u64,
    pub frames_received: u64,
    pub readings_decoded: u64,
    pub frames_ignored: u64,
    pub frames_lost: u64,
    pub published: u64,
    pub publish_failures: u64,
    pub confirmed: u64,
    pub delivery_failures: u64,
    pub config_applied: u64,
    pub config_rejected: u64,
}

/// Decode one received frame and fold it into the telemetry state
pub fn handle_frame(state: &TelemetryState, stats: &BridgeStats, frame: &Frame) -> Option<Reading> {
    stats.frames_received.fetch_add(1, Ordering::Relaxed);
    metrics::counter!("obd_frames_received_total").increment(1);
    match decode(frame) {
        Some(reading) => {
            state.apply(reading);
            stats.readings_decoded.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("obd_readings_decoded_total").increment(1);
            Some(reading)
        }
        None => {
            stats.frames_ignored.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("obd_frames_ignored_total").increment(1);
            None
        }
    }
}

/// Apply the interval carried by a desired-config document, if any
pub fn handle_desired_config(interval: &PollInterval, stats: &BridgeStats, doc: &Value) {
    info!("Desired config update: {}", doc);
    let applied = match desired_interval(doc) {
        Ok(Some(seconds)) => interval.apply_interval(seconds).is_ok(),
        Ok(None) => {
            debug!("Desired config carries no poll interval");
            return;
        }
        Err(e) => {
            warn!("{}", e);
            false
        }
    };

    if applied {
        stats.config_applied.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("bridge_config_applied_total").increment(1);
    } else {
        stats.config_rejected.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("bridge_config_rejected_total").increment(1);
    }
}

/// Route one sink event to the confirmation log or the interval
pub fn handle_sink_event(
    interval: &PollInterval,
    stats: &BridgeStats,
    publish_stats: &PublishStats,
    event: SinkEvent,
) {
    match event {
        SinkEvent::Confirmed(confirmation) => publish_stats.record_confirmation(&confirmation),
        SinkEvent::DesiredConfig(doc) => handle_desired_config(interval, stats, &doc),
    }
}

async fn run_frame_handler(
    mut frames: broadcast::Receiver<Frame>,
    state: TelemetryState,
    stats: Arc<BridgeStats>,
) {
    loop {
        match frames.recv().await {
            Ok(frame) => {
                handle_frame(&state, &stats, &frame);
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Frame handler fell behind, {} frames lost", missed);
                stats.frames_lost.fetch_add(missed, Ordering::Relaxed);
                metrics::counter!("obd_frames_lost_total").increment(missed);
            }
            Err(broadcast::error::RecvError::Closed) => {
                info!("Bus delivery closed");
                break;
            }
        }
    }
}

async fn run_event_handler(
    mut events: mpsc::Receiver<SinkEvent>,
    interval: PollInterval,
    stats: Arc<BridgeStats>,
    publish_stats: Arc<PublishStats>,
) {
    while let Some(event) = events.recv().await {
        handle_sink_event(&interval, &stats, &publish_stats, event);
    }
    debug!("Sink event channel closed");
}

struct Activities {
    frame_handler: JoinHandle<()>,
    poller: PeriodicTask,
    publisher: PeriodicTask,
    poll_stats: Arc<PollStats>,
}

/// Process-scoped coordinator
pub struct Bridge {
    state: TelemetryState,
    interval: PollInterval,
    stats: Arc<BridgeStats>,
    publish_stats: Arc<PublishStats>,
    event_handler: JoinHandle<()>,
    activities: Option<Activities>,
}

impl Bridge {
    /// Create the coordinator and start draining `events` from the sink
    pub fn new(interval: PollInterval, events: mpsc::Receiver<SinkEvent>) -> Self {
        let stats = Arc::new(BridgeStats::default());
        let publish_stats = Arc::new(PublishStats::default());

        let event_handler = tokio::spawn(run_event_handler(
            events,
            interval.clone(),
            Arc::clone(&stats),
            Arc::clone(&publish_stats),
        ));

        Self {
            state: TelemetryState::new(),
            interval,
            stats,
            publish_stats,
            event_handler,
            activities: None,
        }
    }

    /// Start the frame handler, poll scheduler and publisher over `bus`.
    ///
    /// Has no effect if already running.
    pub fn start<B: BusChannel, S: TelemetrySink>(
        &mut self,
        bus: Arc<B>,
        sink: Arc<S>,
        options: &BridgeOptions,
    ) {
        if self.activities.is_some() {
            warn!("Bridge already running");
            return;
        }

        // subscribe before the first request goes out
        let frames = bus.subscribe();
        let frame_handler = tokio::spawn(run_frame_handler(
            frames,
            self.state.clone(),
            Arc::clone(&self.stats),
        ));

        info!("Starting OBD-II queries on {}", bus.name());
        let scheduler = PollScheduler::new(bus, options.scheduler.clone());
        let poll_stats = scheduler.stats();
        let poller = PeriodicTask::spawn(scheduler, Duration::ZERO, self.interval.clone());

        let publisher = Publisher::new(sink, self.state.clone(), &options.output)
            .with_stats(Arc::clone(&self.publish_stats));
        let publisher = PeriodicTask::spawn(publisher, options.warmup, self.interval.clone());

        self.activities = Some(Activities {
            frame_handler,
            poller,
            publisher,
            poll_stats,
        });
    }

    pub fn status(&self) -> BridgeStatus {
        match self.activities {
            Some(_) => BridgeStatus::Running,
            None => BridgeStatus::Initializing,
        }
    }

    /// Shared telemetry state
    pub fn state(&self) -> &TelemetryState {
        &self.state
    }

    /// Shared poll/publish interval
    pub fn interval(&self) -> &PollInterval {
        &self.interval
    }

    /// Copy of every counter
    pub fn summary(&self) -> BridgeSummary {
        let poll_stats = self.activities.as_ref().map(|a| a.poll_stats.as_ref());
        self.collect(poll_stats)
    }

    fn collect(&self, poll_stats: Option<&PollStats>) -> BridgeSummary {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let mut summary = BridgeSummary {
            frames_received: load(&self.stats.frames_received),
            readings_decoded: load(&self.stats.readings_decoded),
            frames_ignored: load(&self.stats.frames_ignored),
            frames_lost: load(&self.stats.frames_lost),
            config_applied: load(&self.stats.config_applied),
            config_rejected: load(&self.stats.config_rejected),
            published: load(&self.publish_stats.published),
            publish_failures: load(&self.publish_stats.publish_failures),
            confirmed: load(&self.publish_stats.confirmed),
            delivery_failures: load(&self.publish_stats.delivery_failures),
            ..Default::default()
        };
        if let Some(poll_stats) = poll_stats {
            summary.poll_rounds = load(&poll_stats.rounds);
            summary.frames_sent = load(&poll_stats.frames_sent);
            summary.send_failures = load(&poll_stats.send_failures);
        }
        summary
    }

    /// Stop every activity and return the final counters
    pub async fn shutdown(mut self) -> BridgeSummary {
        let mut poll_stats = None;
        if let Some(activities) = self.activities.take() {
            activities.poller.stop().await;
            activities.publisher.stop().await;
            activities.frame_handler.abort();
            poll_stats = Some(activities.poll_stats);
        }
        self.event_handler.abort();

        // counted after the last round and publish have finished
        let summary = self.collect(poll_stats.as_deref());
        info!("Bridge stopped: {:?}", summary);
        summary
    }
}
