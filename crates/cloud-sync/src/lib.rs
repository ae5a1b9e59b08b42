//! Cloud Synchronization Module
//!
//! Telemetry publishing to a remote sink:
//! - JSON payload rendering
//! - Periodic publisher with delivery confirmation tracking
//! - MQTT sink with acknowledgement timeouts
//! - Desired-config documents pushed by the remote side

mod desired;
mod error;
mod mqtt;
mod payload;
mod publisher;
mod sink;

pub use desired::{desired_interval, parse_document, INTERVAL_FIELD};
pub use error::CloudError;
pub use mqtt::{MqttConfig, MqttSink};
pub use payload::TelemetryPayload;
pub use publisher::{PublishStats, Publisher, DEFAULT_OUTPUT, WARMUP_DELAY};
pub use sink::{
    Confirmation, DeliveryStatus, MemorySink, MessageContext, PublishedMessage, SinkEvent,
    TelemetrySink, EVENT_BUFFER,
};
