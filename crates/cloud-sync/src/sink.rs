//! Remote Sink Boundary
//!
//! A sink accepts a payload for a named output and later reports, through
//! its event channel, whether the message was delivered. Desired-config
//! documents pushed by the remote side travel over the same channel.

use crate::error::CloudError;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

/// Per-message token echoed back in the delivery confirmation
pub type MessageContext = u64;

/// Capacity of a sink's event channel
pub const EVENT_BUFFER: usize = 64;

/// Delivery result for one published message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    Timeout,
    Failed(String),
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryStatus::Delivered => f.write_str("OK"),
            DeliveryStatus::Timeout => f.write_str("MESSAGE_TIMEOUT"),
            DeliveryStatus::Failed(reason) => write!(f, "ERROR ({})", reason),
        }
    }
}

/// Asynchronous delivery report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub context: MessageContext,
    pub status: DeliveryStatus,
}

/// Events a sink reports back to the bridge
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Confirmed(Confirmation),
    DesiredConfig(Value),
}

/// Destination for serialized telemetry
pub trait TelemetrySink: Send + Sync + 'static {
    /// Queue `payload` for `output`; delivery is confirmed later
    fn publish(
        &self,
        output: &str,
        payload: Vec<u8>,
        context: MessageContext,
    ) -> impl Future<Output = Result<(), CloudError>> + Send;
}

/// A message handed to a [`MemorySink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub output: String,
    pub payload: Vec<u8>,
    pub context: MessageContext,
}

/// In-process sink that records messages and confirms them immediately
pub struct MemorySink {
    messages: Mutex<Vec<PublishedMessage>>,
    events: mpsc::Sender<SinkEvent>,
    offline: AtomicBool,
}

impl MemorySink {
    pub fn new() -> (Self, mpsc::Receiver<SinkEvent>) {
        let (events, rx) = mpsc::channel(EVENT_BUFFER);
        let sink = Self {
            messages: Mutex::new(Vec::new()),
            events,
            offline: AtomicBool::new(false),
        };
        (sink, rx)
    }

    /// While offline, publishes fail immediately
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Messages accepted so far
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Deliver a desired-config document as if pushed by the remote side
    pub async fn push_desired(&self, doc: Value) -> Result<(), CloudError> {
        self.events
            .send(SinkEvent::DesiredConfig(doc))
            .await
            .map_err(|e| CloudError::Connection(e.to_string()))
    }
}

impl TelemetrySink for MemorySink {
    async fn publish(
        &self,
        output: &str,
        payload: Vec<u8>,
        context: MessageContext,
    ) -> Result<(), CloudError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CloudError::Publish("sink offline".to_string()));
        }

        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PublishedMessage {
                output: output.to_string(),
                payload,
                context,
            });

        let confirmation = Confirmation {
            context,
            status: DeliveryStatus::Delivered,
        };
        // a full or closed event channel only loses the report
        let _ = self.events.try_send(SinkEvent::Confirmed(confirmation));
        Ok(())
    }
}
