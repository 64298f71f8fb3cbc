//! ADC Core - Register protocol, device registry and command dispatch
//!
//! This crate provides the transport-independent part of ADC device control:
//! - Register word/frame codec for the binary register protocol
//! - The `DeviceControl` capability that transports implement
//! - Device registry mapping logical names to control handles
//! - Command dispatcher shared by the HTTP API and the CLI
//! - An in-memory device for dry runs and tests

pub mod device;
pub mod dispatch;
pub mod memory;
pub mod reg;
pub mod registry;

pub use device::{DeviceControl, DeviceError};
pub use dispatch::{dispatch, Command, DispatchError, FailureKind, Outcome, Payload, Target, Verb};
pub use memory::MemoryDevice;
pub use reg::{parse_hex_u16, FrameError, HexError, RegFrame, RegHex, RegOp, REG_NUM_MASK, WORD_LEN};
pub use registry::{DeviceRegistry, RegistryError, ALL_DEVICES};
