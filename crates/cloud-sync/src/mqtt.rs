//! MQTT Telemetry Sink
//!
//! Publishes with QoS 1 and turns broker acknowledgements into delivery
//! confirmations. Messages still unacknowledged after the message timeout
//! are reported as timed out. Documents published on the desired-config
//! topic are forwarded as [`SinkEvent::DesiredConfig`].

use crate::desired::parse_document;
use crate::error::CloudError;
use crate::sink::{Confirmation, DeliveryStatus, MessageContext, SinkEvent, TelemetrySink, EVENT_BUFFER};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Pause before polling again after a connection error
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// How often unacknowledged messages are checked for timeout
const TIMEOUT_SWEEP: Duration = Duration::from_secs(1);

/// Requests the client buffers before publishes are refused
const REQUEST_CAPACITY: usize = 10;

/// MQTT connection settings
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Topic carrying desired-config documents
    pub desired_topic: String,
    pub keep_alive: Duration,
    /// Time allowed for a broker acknowledgement
    pub message_timeout: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "obd-bridge".to_string(),
            desired_topic: "obd-bridge/desired".to_string(),
            keep_alive: Duration::from_secs(30),
            message_timeout: Duration::from_millis(10_000),
        }
    }
}

/// A message handed to the client and not yet acknowledged
#[derive(Debug, Clone, Copy)]
struct Tracked {
    context: MessageContext,
    since: Instant,
    /// Timeout already reported; a late acknowledgement is dropped
    timed_out: bool,
}

impl Tracked {
    fn new(context: MessageContext, since: Instant) -> Self {
        Self {
            context,
            since,
            timed_out: false,
        }
    }
}

/// Messages awaiting acknowledgement.
///
/// The client writes requests in the order they were accepted, so queued
/// entries pair with outgoing packet ids front to back. Entries stay until
/// they leave the client, even after timing out, so that pairing holds.
#[derive(Debug, Default)]
struct Pending {
    /// Accepted by the client, packet id not yet assigned
    queued: VecDeque<Tracked>,
    /// Written to the broker, keyed by packet id
    in_flight: HashMap<u16, Tracked>,
}

impl Pending {
    fn sent(&mut self, pkid: u16) {
        // retransmissions reuse their packet id
        if self.in_flight.contains_key(&pkid) {
            return;
        }
        if let Some(entry) = self.queued.pop_front() {
            self.in_flight.insert(pkid, entry);
        }
    }

    /// Context to confirm for an acknowledged packet, unless already timed out
    fn acked(&mut self, pkid: u16) -> Option<MessageContext> {
        self.in_flight
            .remove(&pkid)
            .filter(|entry| !entry.timed_out)
            .map(|entry| entry.context)
    }

    /// Mark entries older than `timeout` and return their contexts once
    fn expired(&mut self, timeout: Duration, now: Instant) -> Vec<MessageContext> {
        let mut expired: Vec<MessageContext> = self
            .queued
            .iter_mut()
            .chain(self.in_flight.values_mut())
            .filter(|entry| !entry.timed_out && now.duration_since(entry.since) >= timeout)
            .map(|entry| {
                entry.timed_out = true;
                entry.context
            })
            .collect();
        expired.sort_unstable();
        expired
    }
}

fn lock(pending: &Mutex<Pending>) -> std::sync::MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Telemetry sink backed by an MQTT broker
pub struct MqttSink {
    client: AsyncClient,
    pending: Arc<Mutex<Pending>>,
    driver: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl MqttSink {
    /// Start the MQTT client and subscribe to the desired-config topic.
    ///
    /// The connection itself is established by the background event loop,
    /// which keeps retrying while the broker is unreachable.
    pub async fn connect(config: MqttConfig) -> Result<(Self, mpsc::Receiver<SinkEvent>), CloudError> {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(config.keep_alive);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        client
            .subscribe(&config.desired_topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| CloudError::Connection(e.to_string()))?;

        let (events, rx) = mpsc::channel(EVENT_BUFFER);
        let pending = Arc::new(Mutex::new(Pending::default()));

        let driver = tokio::spawn(drive(
            eventloop,
            config.desired_topic.clone(),
            Arc::clone(&pending),
            events.clone(),
        ));
        let sweeper = tokio::spawn(sweep(
            config.message_timeout,
            Arc::clone(&pending),
            events,
        ));

        info!(
            "MQTT client {} started for broker {}:{}",
            config.client_id, config.host, config.port
        );
        Ok((
            Self {
                client,
                pending,
                driver,
                sweeper,
            },
            rx,
        ))
    }
}

async fn confirm(events: &mpsc::Sender<SinkEvent>, context: MessageContext, status: DeliveryStatus) {
    let _ = events
        .send(SinkEvent::Confirmed(Confirmation { context, status }))
        .await;
}

async fn drive(
    mut eventloop: EventLoop,
    desired_topic: String,
    pending: Arc<Mutex<Pending>>,
    events: mpsc::Sender<SinkEvent>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                lock(&pending).sent(pkid);
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                let context = lock(&pending).acked(ack.pkid);
                if let Some(context) = context {
                    confirm(&events, context, DeliveryStatus::Delivered).await;
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) if publish.topic == desired_topic => {
                match parse_document(&publish.payload) {
                    Ok(doc) => {
                        let _ = events.send(SinkEvent::DesiredConfig(doc)).await;
                    }
                    Err(e) => warn!("Ignoring desired config on {}: {}", publish.topic, e),
                }
            }
            Ok(Event::Incoming(incoming)) => {
                debug!("MQTT incoming: {:?}", incoming);
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT error: {}", e);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

async fn sweep(timeout: Duration, pending: Arc<Mutex<Pending>>, events: mpsc::Sender<SinkEvent>) {
    let mut ticker = tokio::time::interval(TIMEOUT_SWEEP);
    loop {
        ticker.tick().await;
        let expired = lock(&pending).expired(timeout, Instant::now());
        for context in expired {
            confirm(&events, context, DeliveryStatus::Timeout).await;
        }
    }
}

impl TelemetrySink for MqttSink {
    /// Hand the message to the client without waiting.
    ///
    /// While the broker is unreachable the client's request queue fills up
    /// and further messages fail immediately instead of blocking the caller.
    async fn publish(
        &self,
        output: &str,
        payload: Vec<u8>,
        context: MessageContext,
    ) -> Result<(), CloudError> {
        // held across the hand-off so the driver sees entries in client order
        let mut pending = lock(&self.pending);
        self.client
            .try_publish(output, QoS::AtLeastOnce, false, payload)
            .map_err(|e| CloudError::Publish(e.to_string()))?;
        pending.queued.push_back(Tracked::new(context, Instant::now()));
        Ok(())
    }
}

impl Drop for MqttSink {
    fn drop(&mut self) {
        self.driver.abort();
        self.sweeper.abort();
    }
}
