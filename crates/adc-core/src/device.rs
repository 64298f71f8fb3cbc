//! Device control capability

use thiserror::Error;

use crate::reg::{FrameError, RegOp};

/// Failure talking to a physical device
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device did not respond within {0} ms")]
    Timeout(u64),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Bad register frame: {0}")]
    Frame(#[from] FrameError),
    #[error("Device rejected the request: {0}")]
    Rejected(String),
}

/// Control operations a single device supports.
///
/// Implementations must serialise concurrent calls themselves: interleaving
/// register words from two requests on one device is undefined.
pub trait DeviceControl: Send + Sync {
    /// Logical device name, unique within a registry
    fn name(&self) -> &str;

    fn read_register(&self, addr: u16) -> Result<u16, DeviceError>;

    /// Snapshot of every register the device defines, in device order
    fn read_all_registers(&self) -> Result<Vec<RegOp>, DeviceError>;

    /// Apply a write operation. `op.read` is expected to be false.
    fn write_register(&self, op: RegOp) -> Result<(), DeviceError>;

    fn start_streaming(&self) -> Result<(), DeviceError>;

    fn stop_streaming(&self) -> Result<(), DeviceError>;
}
