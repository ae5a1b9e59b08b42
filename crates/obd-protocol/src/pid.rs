//! OBD-II PID Catalogue and Response Decoding
//!
//! Only single-frame Mode 01 responses from the primary ECU (0x7E8) are
//! decoded. The first frame of an ISO-TP multi-frame response is reported and
//! dropped; continuation frames are never reassembled.

use crate::error::DecodeError;
use crate::frame::Frame;
use crate::{id, mode};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// ISO-TP protocol control byte marking a first frame
pub const ISO_TP_FIRST_FRAME: u8 = 0x10;

/// Positive response to a Mode 01 request
pub const POSITIVE_CURRENT_DATA: u8 = mode::CURRENT_DATA + 0x40;

/// Engine parameters polled by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ParameterKind {
    /// Engine coolant temperature (0x05)
    CoolantTemp = 0x05,
    /// Engine RPM (0x0C)
    Rpm = 0x0C,
    /// Mass air flow rate (0x10)
    Maf = 0x10,
}

impl ParameterKind {
    /// All kinds in polling order
    pub const ALL: [ParameterKind; 3] = [
        ParameterKind::CoolantTemp,
        ParameterKind::Rpm,
        ParameterKind::Maf,
    ];

    /// Get the PID byte
    pub fn pid(&self) -> u8 {
        *self as u8
    }

    /// Look up a kind by PID byte
    pub fn from_pid(pid: u8) -> Option<Self> {
        match pid {
            0x05 => Some(ParameterKind::CoolantTemp),
            0x0C => Some(ParameterKind::Rpm),
            0x10 => Some(ParameterKind::Maf),
            _ => None,
        }
    }

    /// Number of value bytes (A, B, ...) following the echoed PID
    pub fn value_bytes(&self) -> usize {
        match self {
            ParameterKind::CoolantTemp => 1,
            ParameterKind::Rpm | ParameterKind::Maf => 2,
        }
    }

    /// Mode 01 request frame for this parameter
    pub fn request_frame(&self) -> Frame {
        Frame::full(id::OBD_REQUEST, [2, mode::CURRENT_DATA, self.pid(), 0, 0, 0, 0, 0])
    }

    /// Apply the decode rule to the value bytes
    fn decode_value(&self, bytes: &[u8]) -> f64 {
        match self {
            // A - 40 (°C)
            ParameterKind::CoolantTemp => bytes[0] as f64 - 40.0,
            // ((A*256)+B)/4
            ParameterKind::Rpm | ParameterKind::Maf => {
                ((bytes[0] as f64 * 256.0) + bytes[1] as f64) / 4.0
            }
        }
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParameterKind::CoolantTemp => "coolant_temp",
            ParameterKind::Rpm => "rpm",
            ParameterKind::Maf => "maf",
        };
        f.write_str(name)
    }
}

/// A successfully decoded parameter value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub kind: ParameterKind,
    pub value: f64,
}

/// Decode a response frame, reporting why a frame was rejected.
///
/// `Ok(None)` means the frame is not addressed to us or carries a PID we do
/// not poll. Errors are frames we should have been able to read but could not.
pub fn try_decode(frame: &Frame) -> Result<Option<Reading>, DecodeError> {
    let data = frame.data();

    let Some(&pci) = data.first() else {
        return Err(DecodeError::Truncated {
            id: frame.id(),
            needed: 1,
            len: 0,
        });
    };

    if pci == ISO_TP_FIRST_FRAME {
        return Err(DecodeError::MultiFrame { id: frame.id() });
    }

    if frame.id() != id::ECU_RESPONSE {
        return Ok(None);
    }

    if data.len() < 3 {
        return Err(DecodeError::Truncated {
            id: frame.id(),
            needed: 3,
            len: data.len(),
        });
    }

    if data[1] != POSITIVE_CURRENT_DATA {
        return Ok(None);
    }

    let Some(kind) = ParameterKind::from_pid(data[2]) else {
        return Ok(None);
    };

    let needed = 3 + kind.value_bytes();
    if data.len() < needed {
        return Err(DecodeError::Truncated {
            id: frame.id(),
            needed,
            len: data.len(),
        });
    }

    Ok(Some(Reading {
        kind,
        value: kind.decode_value(&data[3..needed]),
    }))
}

/// Decode a response frame, logging and ignoring anything unusable
pub fn decode(frame: &Frame) -> Option<Reading> {
    match try_decode(frame) {
        Ok(Some(reading)) => {
            debug!("Decoded {} = {} from {:?}", reading.kind, reading.value, frame);
            Some(reading)
        }
        Ok(None) => None,
        Err(e @ DecodeError::MultiFrame { .. }) => {
            debug!("{}, dropping first frame {:?}", e, frame);
            None
        }
        Err(e) => {
            warn!("Decode error: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn response(data: &[u8]) -> Frame {
        Frame::new(id::ECU_RESPONSE, data).unwrap()
    }

    #[test]
    fn test_coolant_temp_decode() {
        let reading = decode(&response(&[2, 0x41, 0x05, 42, 0, 0, 0, 0])).unwrap();
        assert_eq!(reading.kind, ParameterKind::CoolantTemp);
        assert!((reading.value - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_coolant_temp_below_zero() {
        let reading = decode(&response(&[3, 0x41, 0x05, 0x00])).unwrap();
        assert!((reading.value + 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rpm_decode() {
        // (26*256 + 248) / 4 = 1702
        let reading = decode(&response(&[4, 0x41, 0x0C, 0x1A, 0xF8, 0, 0, 0])).unwrap();
        assert_eq!(reading.kind, ParameterKind::Rpm);
        assert!((reading.value - 1702.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_maf_decode() {
        let reading = decode(&response(&[4, 0x41, 0x10, 0x00, 0x0E, 0, 0, 0])).unwrap();
        assert_eq!(reading.kind, ParameterKind::Maf);
        assert!((reading.value - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_pid_ignored() {
        assert_eq!(try_decode(&response(&[3, 0x41, 0x0D, 55, 0, 0, 0, 0])), Ok(None));
    }

    #[test]
    fn test_multi_frame_reported() {
        let frame = response(&[0x10, 0x14, 0x49, 0x02, 0x01, 0x57, 0x30, 0x4C]);
        assert_eq!(
            try_decode(&frame),
            Err(DecodeError::MultiFrame { id: 0x7E8 })
        );
        assert_eq!(decode(&frame), None);
    }

    #[test]
    fn test_truncated_frames_reported() {
        assert_eq!(
            try_decode(&response(&[])),
            Err(DecodeError::Truncated { id: 0x7E8, needed: 1, len: 0 })
        );
        assert_eq!(
            try_decode(&response(&[2, 0x41])),
            Err(DecodeError::Truncated { id: 0x7E8, needed: 3, len: 2 })
        );
        assert_eq!(
            try_decode(&response(&[3, 0x41, 0x0C, 0x1A])),
            Err(DecodeError::Truncated { id: 0x7E8, needed: 5, len: 4 })
        );
        assert_eq!(decode(&response(&[2, 0x41, 0x05])), None);
    }

    #[test]
    fn test_short_frame_from_other_id_ignored() {
        let frame = Frame::new(0x7E9, &[1]).unwrap();
        assert_eq!(try_decode(&frame), Ok(None));
    }

    #[test]
    fn test_request_frames_match_catalogue() {
        for kind in ParameterKind::ALL {
            let frame = kind.request_frame();
            assert_eq!(frame.id(), 0x7DF);
            assert_eq!(frame.data(), &[2, 1, kind.pid(), 0, 0, 0, 0, 0]);
            assert_eq!(ParameterKind::from_pid(frame.data()[2]), Some(kind));
        }
        let pids: Vec<u8> = ParameterKind::ALL.iter().map(|k| k.pid()).collect();
        assert_eq!(pids, vec![0x05, 0x0C, 0x10]);
    }

    proptest! {
        #[test]
        fn prop_first_frames_always_ignored(
            can_id in 0u16..=0x7FF,
            rest in proptest::collection::vec(any::<u8>(), 0..=7),
        ) {
            let mut data = vec![ISO_TP_FIRST_FRAME];
            data.extend(rest);
            let frame = Frame::new(can_id, &data).unwrap();
            prop_assert_eq!(decode(&frame), None);
        }

        #[test]
        fn prop_foreign_ids_ignored(
            can_id in (0u16..=0x7FF).prop_filter("not the ECU", |i| *i != 0x7E8),
            data in proptest::collection::vec(any::<u8>(), 0..=8),
        ) {
            let frame = Frame::new(can_id, &data).unwrap();
            prop_assert_eq!(decode(&frame), None);
        }

        #[test]
        fn prop_non_positive_service_ignored(
            service in any::<u8>().prop_filter("not 0x41", |s| *s != 0x41),
            pid in any::<u8>(),
            a in any::<u8>(),
            b in any::<u8>(),
        ) {
            let frame = response(&[4, service, pid, a, b, 0, 0, 0]);
            prop_assert_eq!(decode(&frame), None);
        }

        #[test]
        fn prop_rpm_matches_formula(a in any::<u8>(), b in any::<u8>()) {
            let reading = decode(&response(&[4, 0x41, 0x0C, a, b, 0, 0, 0])).unwrap();
            prop_assert_eq!(reading.value, (256.0 * a as f64 + b as f64) / 4.0);
        }
    }
}
