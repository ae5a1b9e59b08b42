//! CAN Frame Model

use crate::error::ObdError;
use std::fmt;

/// Largest standard (11-bit) arbitration identifier
pub const MAX_STANDARD_ID: u16 = 0x7FF;

/// Classic CAN payload limit
pub const MAX_DATA_LEN: usize = 8;

/// An immutable classic CAN frame with a standard identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame {
    id: u16,
    len: u8,
    data: [u8; MAX_DATA_LEN],
}

impl Frame {
    /// Build a frame, rejecting ids above 0x7FF and payloads over 8 bytes
    pub fn new(id: u16, data: &[u8]) -> Result<Self, ObdError> {
        if id > MAX_STANDARD_ID {
            return Err(ObdError::InvalidId(id as u32));
        }
        if data.len() > MAX_DATA_LEN {
            return Err(ObdError::InvalidFrame(data.len()));
        }

        let mut buf = [0u8; MAX_DATA_LEN];
        buf[..data.len()].copy_from_slice(data);

        Ok(Self {
            id,
            len: data.len() as u8,
            data: buf,
        })
    }

    /// Build an 8-byte frame from a known-valid standard id
    pub(crate) const fn full(id: u16, data: [u8; MAX_DATA_LEN]) -> Self {
        Self {
            id: id & MAX_STANDARD_ID,
            len: MAX_DATA_LEN as u8,
            data,
        }
    }

    /// Arbitration identifier
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Payload bytes
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// Number of payload bytes
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03X}#", self.id)?;
        for byte in self.data() {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rejects_extended_id() {
        assert!(matches!(Frame::new(0x800, &[]), Err(ObdError::InvalidId(0x800))));
    }

    #[test]
    fn test_frame_rejects_long_payload() {
        assert!(matches!(
            Frame::new(0x7DF, &[0; 9]),
            Err(ObdError::InvalidFrame(9))
        ));
    }

    #[test]
    fn test_short_frame_keeps_length() {
        let frame = Frame::new(0x7E8, &[3, 0x41, 0x05]).unwrap();
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.data(), &[3, 0x41, 0x05]);
        assert_eq!(format!("{:?}", frame), "7E8#034105");
    }
}
