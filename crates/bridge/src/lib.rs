//! OBD-II Telemetry Bridge
//!
//! Polls engine coolant temperature, RPM and mass air flow over an OBD-II
//! bus and republishes the latest values to an MQTT broker. The poll and
//! publish interval can be changed remotely while running.

mod coordinator;
mod error;
mod settings;

pub use coordinator::{
    handle_desired_config, handle_frame, handle_sink_event, Bridge, BridgeOptions, BridgeStats,
    BridgeStatus, BridgeSummary,
};
pub use error::BridgeError;
pub use settings::{BridgeSettings, BusBackend, BusSettings, MqttSettings, PollSettings};

use obd_protocol::ObdError;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Initialize logging
pub fn init_logging(level: &str, json: bool) {
    let level = Level::from_str(level).unwrap_or(Level::INFO);

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }
}

/// Open the SocketCAN interface with the standard OBD-II filter set
#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub fn open_socketcan(interface: &str) -> Result<obd_protocol::SocketCanBus, ObdError> {
    obd_protocol::SocketCanBus::open(interface, obd_protocol::default_filters())
}

/// SocketCAN support is not compiled into this build
#[cfg(not(all(target_os = "linux", feature = "socketcan")))]
pub fn open_socketcan(interface: &str) -> Result<obd_protocol::LoopbackBus, ObdError> {
    Err(ObdError::BusOpen {
        interface: interface.to_string(),
        reason: "SocketCAN support not compiled in (enable the `socketcan` feature)".to_string(),
    })
}
