//! ADC MLink - UDP transport for the register protocol
//!
//! Wraps register frames in MLink packets (header + CRC-32 trailer), sends
//! them over UDP and exposes the result as an `adc_core::DeviceControl`.

pub mod device;
pub mod frame;
pub mod transport;

pub use device::{MLinkDevice, MStreamControl};
pub use frame::{MLinkError, MLinkHeader, MAX_OPS_PER_FRAME};
pub use transport::{MLinkTransport, DEFAULT_HOST_ID, DEFAULT_TIMEOUT_MS, MLINK_PORT};
