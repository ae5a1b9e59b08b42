//! OBD Bridge - Main Entry Point

use bridge::{init_logging, open_socketcan, Bridge, BridgeSettings, BusBackend};
use cloud_sync::MqttSink;
use obd_protocol::{default_filters, LoopbackBus};
use obd_scheduler::PollInterval;
use std::sync::Arc;
use tracing::{error, info};

/// Environment variable naming an explicit settings file
const SETTINGS_ENV: &str = "OBD_BRIDGE_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings_path = std::env::var(SETTINGS_ENV).ok();
    let settings = BridgeSettings::load(settings_path.as_deref())?;
    init_logging(&settings.log_level, settings.log_json);

    info!("=== OBD Bridge v{} ===", env!("CARGO_PKG_VERSION"));

    let interval = PollInterval::new(settings.poll.interval_seconds)?;
    let (sink, events) = MqttSink::connect(settings.mqtt_config()).await?;
    let sink = Arc::new(sink);

    let mut bridge = Bridge::new(interval, events);
    let options = settings.bridge_options();

    info!("Initializing CAN bus {}", settings.bus.interface);
    match settings.bus.backend {
        BusBackend::Simulated => {
            let bus = LoopbackBus::simulated(&settings.bus.interface, default_filters());
            bridge.start(Arc::new(bus), sink, &options);
        }
        BusBackend::Socketcan => match open_socketcan(&settings.bus.interface) {
            Ok(bus) => bridge.start(Arc::new(bus), sink, &options),
            Err(e) => error!("Error initializing CAN bus: {}", e),
        },
    }

    info!("Bridge is {:?}; press Ctrl-C to exit", bridge.status());
    tokio::signal::ctrl_c().await?;

    info!("Shutdown requested");
    bridge.shutdown().await;
    Ok(())
}
