//! SocketCAN Bus Channel (Linux)

use crate::channel::{accepts, BusChannel, BusFilter, FRAME_BUFFER};
use crate::error::ObdError;
use crate::frame::Frame;
use socketcan::tokio::CanSocket;
use socketcan::{CanFrame, EmbeddedFrame, Id, StandardId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Back-off after a failed socket read
const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Bus channel over a SocketCAN interface such as `can0`
pub struct SocketCanBus {
    name: String,
    socket: Arc<CanSocket>,
    inbound: broadcast::Sender<Frame>,
    reader: JoinHandle<()>,
}

impl SocketCanBus {
    /// Open the interface and start delivering frames that pass `filters`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(interface: &str, filters: Vec<BusFilter>) -> Result<Self, ObdError> {
        let socket = CanSocket::open(interface).map_err(|e| ObdError::BusOpen {
            interface: interface.to_string(),
            reason: e.to_string(),
        })?;
        let socket = Arc::new(socket);
        let (inbound, _) = broadcast::channel(FRAME_BUFFER);

        let reader = tokio::spawn(read_loop(
            interface.to_string(),
            Arc::clone(&socket),
            filters,
            inbound.clone(),
        ));

        info!("Opened SocketCAN interface {}", interface);
        Ok(Self {
            name: interface.to_string(),
            socket,
            inbound,
            reader,
        })
    }
}

async fn read_loop(
    name: String,
    socket: Arc<CanSocket>,
    filters: Vec<BusFilter>,
    inbound: broadcast::Sender<Frame>,
) {
    loop {
        match socket.read_frame().await {
            Ok(CanFrame::Data(raw)) => {
                let Id::Standard(sid) = raw.id() else {
                    continue;
                };
                let can_id = sid.as_raw();
                if !accepts(&filters, can_id) {
                    continue;
                }
                match Frame::new(can_id, raw.data()) {
                    Ok(frame) => {
                        let _ = inbound.send(frame);
                    }
                    Err(e) => debug!("{}: dropping frame: {}", name, e),
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!("{}: read failed: {}", name, e);
                tokio::time::sleep(READ_RETRY_DELAY).await;
            }
        }
    }
}

impl BusChannel for SocketCanBus {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, frame: Frame) -> Result<(), ObdError> {
        let sid = StandardId::new(frame.id()).ok_or(ObdError::InvalidId(frame.id() as u32))?;
        let raw = CanFrame::new(sid, frame.data()).ok_or(ObdError::InvalidFrame(frame.len()))?;
        self.socket.write_frame(raw).await?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.inbound.subscribe()
    }
}

impl Drop for SocketCanBus {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
