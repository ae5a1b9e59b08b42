//! Published Telemetry Message

use crate::error::CloudError;
use obd_protocol::TelemetrySnapshot;
use serde::Serialize;
use serde_json::value::RawValue;

/// JSON body sent to the output topic.
///
/// `coolant_temp` is written with exactly two decimals, e.g.
/// `{"coolant_temp":22.50,"rpms":812.25,"maf":3.5}`.
#[derive(Debug, Serialize)]
pub struct TelemetryPayload {
    coolant_temp: Box<RawValue>,
    rpms: f64,
    maf: f64,
}

impl TelemetryPayload {
    pub fn from_snapshot(snapshot: &TelemetrySnapshot) -> Result<Self, CloudError> {
        let coolant_temp = RawValue::from_string(format!("{:.2}", snapshot.coolant_temp))?;
        Ok(Self {
            coolant_temp,
            rpms: snapshot.rpm,
            maf: snapshot.maf,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CloudError> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn render(snapshot: TelemetrySnapshot) -> String {
        let bytes = TelemetryPayload::from_snapshot(&snapshot)
            .unwrap()
            .to_bytes()
            .unwrap();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_payload_format() {
        let text = render(TelemetrySnapshot {
            coolant_temp: 22.5,
            rpm: 812.25,
            maf: 3.5,
        });
        assert_eq!(text, r#"{"coolant_temp":22.50,"rpms":812.25,"maf":3.5}"#);
    }

    #[test]
    fn test_default_snapshot_payload() {
        let text = render(TelemetrySnapshot::default());
        assert_eq!(text, r#"{"coolant_temp":0.00,"rpms":0.0,"maf":0.0}"#);
    }

    #[test]
    fn test_payload_has_exactly_three_keys() {
        let text = render(TelemetrySnapshot {
            coolant_temp: -7.0,
            rpm: 1702.0,
            maf: 3.5,
        });
        let value: Value = serde_json::from_str(&text).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 3);
        assert_eq!(object["coolant_temp"].as_f64(), Some(-7.0));
        assert_eq!(object["rpms"].as_f64(), Some(1702.0));
        assert_eq!(object["maf"].as_f64(), Some(3.5));
    }

    #[test]
    fn test_coolant_rounded_to_two_decimals() {
        let text = render(TelemetrySnapshot {
            coolant_temp: 1.0 / 3.0,
            ..Default::default()
        });
        assert!(text.starts_with(r#"{"coolant_temp":0.33,"#));
    }
}
