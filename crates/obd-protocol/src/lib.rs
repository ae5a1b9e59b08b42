//! OBD-II Protocol Implementation
//!
//! Frame model, Mode 01 PID catalogue and response decoding, the shared
//! telemetry snapshot, and the bus channel abstraction the bridge polls
//! through. Bus backends: an in-memory loopback (optionally answered by a
//! simulated ECU) and, with the `socketcan` feature on Linux, SocketCAN.

mod channel;
mod error;
mod frame;
mod loopback;
mod pid;
#[cfg(all(target_os = "linux", feature = "socketcan"))]
mod socketcan_bus;
mod telemetry;

pub use channel::{accepts, default_filters, BusChannel, BusFilter, FRAME_BUFFER};
pub use error::{DecodeError, ObdError};
pub use frame::{Frame, MAX_DATA_LEN, MAX_STANDARD_ID};
pub use loopback::{LoopbackBus, SimulatedEcu};
pub use pid::{decode, try_decode, ParameterKind, Reading, ISO_TP_FIRST_FRAME};
#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub use socketcan_bus::SocketCanBus;
pub use telemetry::{TelemetrySnapshot, TelemetryState};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
}

/// Standard 11-bit OBD-II arbitration ids
pub mod id {
    /// Functional (broadcast) request id
    pub const OBD_REQUEST: u16 = 0x7DF;
    /// Base of the physical ECU id range
    pub const ECU_RANGE_BASE: u16 = 0x7E0;
    /// Engine control module response id
    pub const ECU_RESPONSE: u16 = 0x7E8;
}
