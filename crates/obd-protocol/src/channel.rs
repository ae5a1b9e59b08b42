//! Bus Channel Abstraction
//!
//! A bus channel is already open and already filtered. Outbound frames go
//! through [`BusChannel::send`]; every accepted inbound frame is broadcast to
//! all subscribers.

use crate::error::ObdError;
use crate::frame::Frame;
use crate::id;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::broadcast;

/// Capacity of the inbound frame broadcast queue
pub const FRAME_BUFFER: usize = 64;

/// Acceptance filter: a frame passes when `frame_id & mask == id & mask`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusFilter {
    pub id: u16,
    pub mask: u16,
}

impl BusFilter {
    pub const fn new(id: u16, mask: u16) -> Self {
        Self { id, mask }
    }

    /// Exact match on the functional request id (0x7DF)
    pub const fn obd_request() -> Self {
        Self::new(id::OBD_REQUEST, 0x7FF)
    }

    /// Range match on ECU response ids (0x7E0..=0x7FF)
    pub const fn ecu_responses() -> Self {
        Self::new(id::ECU_RANGE_BASE, id::ECU_RANGE_BASE)
    }

    /// Check whether an identifier passes this filter
    pub fn matches(&self, frame_id: u16) -> bool {
        frame_id & self.mask == self.id & self.mask
    }
}

/// The filter set the bridge opens its channel with
pub fn default_filters() -> Vec<BusFilter> {
    vec![BusFilter::obd_request(), BusFilter::ecu_responses()]
}

/// Check an identifier against a filter set; an empty set accepts everything
pub fn accepts(filters: &[BusFilter], frame_id: u16) -> bool {
    filters.is_empty() || filters.iter().any(|f| f.matches(frame_id))
}

/// An open, filtered bus
pub trait BusChannel: Send + Sync + 'static {
    /// Interface name for diagnostics
    fn name(&self) -> &str;

    /// Write one frame to the bus
    fn send(&self, frame: Frame) -> impl Future<Output = Result<(), ObdError>> + Send;

    /// Receive every frame accepted after this call
    fn subscribe(&self) -> broadcast::Receiver<Frame>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_filter_is_exact() {
        let filter = BusFilter::obd_request();
        assert!(filter.matches(0x7DF));
        assert!(!filter.matches(0x7DE));
        assert!(!filter.matches(0x7E8));
    }

    #[test]
    fn test_response_filter_covers_ecu_range() {
        let filter = BusFilter::ecu_responses();
        for ecu in 0x7E0..=0x7EF {
            assert!(filter.matches(ecu));
        }
        assert!(!filter.matches(0x7DF));
        assert!(!filter.matches(0x123));
    }

    #[test]
    fn test_default_filter_set() {
        let filters = default_filters();
        assert!(accepts(&filters, 0x7DF));
        assert!(accepts(&filters, 0x7E8));
        assert!(!accepts(&filters, 0x100));
        assert!(accepts(&[], 0x100));
    }
}
