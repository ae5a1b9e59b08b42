//! Telemetry Publisher
//!
//! On every tick the whole snapshot is serialized and handed to the sink
//! with a fresh sequence number as its context. Delivery is confirmed later
//! through the sink's event channel; failures are logged and never retried.

use crate::error::CloudError;
use crate::payload::TelemetryPayload;
use crate::sink::{Confirmation, DeliveryStatus, MessageContext, TelemetrySink};
use obd_protocol::TelemetryState;
use obd_scheduler::Periodic;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Grace period between bus start-up and the first publish
pub const WARMUP_DELAY: Duration = Duration::from_millis(500);

/// Default output name
pub const DEFAULT_OUTPUT: &str = "output1";

/// Running totals for publishing and delivery
#[derive(Debug, Default)]
pub struct PublishStats {
    pub published: AtomicU64,
    pub publish_failures: AtomicU64,
    pub confirmed: AtomicU64,
    pub delivery_failures: AtomicU64,
}

impl PublishStats {
    /// Record and log a delivery report from the sink
    pub fn record_confirmation(&self, confirmation: &Confirmation) {
        let total = self.confirmed.fetch_add(1, Ordering::Relaxed) + 1;
        match &confirmation.status {
            DeliveryStatus::Delivered => {
                info!(
                    "Confirmation[{}] received with result = {}",
                    confirmation.context, confirmation.status
                );
                metrics::counter!("telemetry_delivered_total").increment(1);
            }
            status => {
                self.delivery_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Confirmation[{}] received with result = {}",
                    confirmation.context, status
                );
                metrics::counter!("telemetry_delivery_failures_total").increment(1);
            }
        }
        info!("Total calls confirmed: {}", total);
    }
}

/// Publishes the telemetry snapshot on every tick
pub struct Publisher<S: TelemetrySink> {
    sink: Arc<S>,
    state: TelemetryState,
    output: String,
    next_context: MessageContext,
    stats: Arc<PublishStats>,
}

impl<S: TelemetrySink> Publisher<S> {
    pub fn new(sink: Arc<S>, state: TelemetryState, output: &str) -> Self {
        Self {
            sink,
            state,
            output: output.to_string(),
            next_context: 0,
            stats: Arc::new(PublishStats::default()),
        }
    }

    /// Count into an existing set of counters
    pub fn with_stats(mut self, stats: Arc<PublishStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Shared handle to the publisher's counters
    pub fn stats(&self) -> Arc<PublishStats> {
        Arc::clone(&self.stats)
    }

    /// Serialize the current snapshot and hand it to the sink
    pub async fn publish_once(&mut self) -> Result<MessageContext, CloudError> {
        let context = self.next_context;
        self.next_context += 1;

        let snapshot = self.state.snapshot();
        let payload = TelemetryPayload::from_snapshot(&snapshot)?.to_bytes()?;
        info!("Sending: {}", String::from_utf8_lossy(&payload));

        self.sink.publish(&self.output, payload, context).await?;
        self.stats.published.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("telemetry_published_total").increment(1);
        Ok(context)
    }
}

impl<S: TelemetrySink> Periodic for Publisher<S> {
    fn name(&self) -> &'static str {
        "publisher"
    }

    async fn tick(&mut self) {
        if let Err(e) = self.publish_once().await {
            self.stats.publish_failures.fetch_add(1, Ordering::Relaxed);
            warn!("Publish to {} failed: {}", self.output, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MemorySink, SinkEvent};
    use obd_protocol::{ParameterKind, Reading};
    use obd_scheduler::{PeriodicTask, PollInterval};

    #[tokio::test]
    async fn test_publish_snapshot_with_sequence() {
        let (sink, mut events) = MemorySink::new();
        let sink = Arc::new(sink);
        let state = TelemetryState::new();
        let mut publisher = Publisher::new(Arc::clone(&sink), state.clone(), DEFAULT_OUTPUT);

        assert_eq!(publisher.publish_once().await.unwrap(), 0);
        state.apply(Reading { kind: ParameterKind::Rpm, value: 812.25 });
        assert_eq!(publisher.publish_once().await.unwrap(), 1);

        let messages = sink.published();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].output, "output1");
        assert_eq!(
            messages[0].payload,
            br#"{"coolant_temp":0.00,"rpms":0.0,"maf":0.0}"#.to_vec()
        );
        assert_eq!(
            messages[1].payload,
            br#"{"coolant_temp":0.00,"rpms":812.25,"maf":0.0}"#.to_vec()
        );

        let stats = publisher.stats();
        while let Ok(SinkEvent::Confirmed(confirmation)) = events.try_recv() {
            stats.record_confirmation(&confirmation);
        }
        assert_eq!(stats.published.load(Ordering::Relaxed), 2);
        assert_eq!(stats.confirmed.load(Ordering::Relaxed), 2);
        assert_eq!(stats.delivery_failures.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_failed_publish_is_counted_not_retried() {
        let (sink, _events) = MemorySink::new();
        let sink = Arc::new(sink);
        sink.set_offline(true);
        let mut publisher = Publisher::new(Arc::clone(&sink), TelemetryState::new(), DEFAULT_OUTPUT);

        publisher.tick().await;
        sink.set_offline(false);
        publisher.tick().await;

        let stats = publisher.stats();
        assert_eq!(stats.publish_failures.load(Ordering::Relaxed), 1);
        assert_eq!(stats.published.load(Ordering::Relaxed), 1);
        // the failed message keeps its sequence number
        assert_eq!(sink.published()[0].context, 1);
    }

    #[test]
    fn test_delivery_failures_counted() {
        let stats = PublishStats::default();
        stats.record_confirmation(&Confirmation {
            context: 3,
            status: DeliveryStatus::Timeout,
        });
        stats.record_confirmation(&Confirmation {
            context: 4,
            status: DeliveryStatus::Failed("connection reset".to_string()),
        });
        assert_eq!(stats.confirmed.load(Ordering::Relaxed), 2);
        assert_eq!(stats.delivery_failures.load(Ordering::Relaxed), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_publish_waits_for_warmup() {
        let (sink, _events) = MemorySink::new();
        let sink = Arc::new(sink);
        let publisher = Publisher::new(Arc::clone(&sink), TelemetryState::new(), DEFAULT_OUTPUT);
        let start = tokio::time::Instant::now();
        let _task = PeriodicTask::spawn(publisher, WARMUP_DELAY, PollInterval::default());

        tokio::time::sleep_until(start + Duration::from_millis(400)).await;
        assert!(sink.published().is_empty());

        tokio::time::sleep_until(start + Duration::from_millis(600)).await;
        let messages = sink.published();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].payload,
            br#"{"coolant_temp":0.00,"rpms":0.0,"maf":0.0}"#.to_vec()
        );
    }
}
