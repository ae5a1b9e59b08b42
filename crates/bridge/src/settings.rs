//! Bridge Settings
//!
//! Built-in defaults, then an optional TOML file, then `OBD_BRIDGE_*`
//! environment variables (`__` separates nesting, e.g.
//! `OBD_BRIDGE_MQTT__HOST=broker.local`).

use crate::coordinator::BridgeOptions;
use crate::error::BridgeError;
use cloud_sync::MqttConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use obd_scheduler::{PollInterval, SchedulerConfig};
use serde::Deserialize;
use std::time::Duration;

/// Settings file read when no path is given
pub const DEFAULT_SETTINGS_FILE: &str = "obd-bridge";

/// Which bus backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// SocketCAN interface (Linux, `socketcan` feature)
    Socketcan,
    /// In-memory bus answered by a simulated ECU
    Simulated,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusSettings {
    pub interface: String,
    pub backend: BusBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollSettings {
    /// Initial poll/publish interval, replaced by desired-config updates
    pub interval_seconds: f64,
    pub guard_delay_ms: u64,
    pub warmup_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub output_topic: String,
    pub desired_topic: String,
    pub keep_alive_secs: u64,
    pub message_timeout_ms: u64,
}

/// Complete bridge configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeSettings {
    pub bus: BusSettings,
    pub poll: PollSettings,
    pub mqtt: MqttSettings,
    pub log_level: String,
    pub log_json: bool,
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    Config::builder()
        .set_default("bus.interface", "can0")?
        .set_default("bus.backend", "socketcan")?
        .set_default("poll.interval_seconds", 5.0)?
        .set_default("poll.guard_delay_ms", 20_i64)?
        .set_default("poll.warmup_ms", 500_i64)?
        .set_default("mqtt.host", "localhost")?
        .set_default("mqtt.port", 1883_i64)?
        .set_default("mqtt.client_id", "obd-bridge")?
        .set_default("mqtt.output_topic", "output1")?
        .set_default("mqtt.desired_topic", "obd-bridge/desired")?
        .set_default("mqtt.keep_alive_secs", 30_i64)?
        .set_default("mqtt.message_timeout_ms", 10_000_i64)?
        .set_default("log_level", "info")?
        .set_default("log_json", false)
}

fn environment() -> Environment {
    Environment::with_prefix("OBD_BRIDGE")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl BridgeSettings {
    /// Load settings from defaults, the settings file and the environment.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&str>) -> Result<Self, BridgeError> {
        let file = File::with_name(path.unwrap_or(DEFAULT_SETTINGS_FILE)).required(path.is_some());
        let settings: Self = defaults()?
            .add_source(file)
            .add_source(environment())
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from TOML text layered over the defaults
    pub fn from_toml(text: &str) -> Result<Self, BridgeError> {
        let settings: Self = defaults()?
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), BridgeError> {
        PollInterval::new(self.poll.interval_seconds)
            .map_err(|e| BridgeError::InvalidSettings(e.to_string()))?;
        if self.mqtt.output_topic.is_empty() {
            return Err(BridgeError::InvalidSettings("mqtt.output_topic is empty".to_string()));
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            guard_delay: Duration::from_millis(self.poll.guard_delay_ms),
        }
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.poll.warmup_ms)
    }

    pub fn bridge_options(&self) -> BridgeOptions {
        BridgeOptions {
            scheduler: self.scheduler_config(),
            warmup: self.warmup(),
            output: self.mqtt.output_topic.clone(),
        }
    }

    pub fn mqtt_config(&self) -> MqttConfig {
        MqttConfig {
            host: self.mqtt.host.clone(),
            port: self.mqtt.port,
            client_id: self.mqtt.client_id.clone(),
            desired_topic: self.mqtt.desired_topic.clone(),
            keep_alive: Duration::from_secs(self.mqtt.keep_alive_secs),
            message_timeout: Duration::from_millis(self.mqtt.message_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = BridgeSettings::from_toml("").unwrap();
        assert_eq!(settings.bus.interface, "can0");
        assert_eq!(settings.bus.backend, BusBackend::Socketcan);
        assert_eq!(settings.poll.interval_seconds, 5.0);
        assert_eq!(settings.scheduler_config().guard_delay, Duration::from_millis(20));
        assert_eq!(settings.warmup(), Duration::from_millis(500));
        assert_eq!(settings.mqtt.output_topic, "output1");
        assert_eq!(settings.mqtt_config().message_timeout, Duration::from_secs(10));
        assert_eq!(settings.log_level, "info");
        assert!(!settings.log_json);
    }

    #[test]
    fn test_file_overrides() {
        let settings = BridgeSettings::from_toml(
            r#"
            log_level = "debug"

            [bus]
            interface = "vcan0"
            backend = "simulated"

            [poll]
            interval_seconds = 1.5

            [mqtt]
            host = "broker.local"
            port = 8883
            "#,
        )
        .unwrap();
        assert_eq!(settings.bus.interface, "vcan0");
        assert_eq!(settings.bus.backend, BusBackend::Simulated);
        assert_eq!(settings.poll.interval_seconds, 1.5);
        assert_eq!(settings.poll.guard_delay_ms, 20);
        assert_eq!(settings.mqtt.host, "broker.local");
        assert_eq!(settings.mqtt.port, 8883);
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn test_rejects_non_positive_interval() {
        let result = BridgeSettings::from_toml("[poll]\ninterval_seconds = 0.0\n");
        assert!(matches!(result, Err(BridgeError::InvalidSettings(_))));
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let result = BridgeSettings::from_toml("[bus]\nbackend = \"serial\"\n");
        assert!(matches!(result, Err(BridgeError::Settings(_))));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = BridgeSettings::load(Some("/nonexistent/obd-bridge.toml"));
        assert!(matches!(result, Err(BridgeError::Settings(_))));
    }
}
