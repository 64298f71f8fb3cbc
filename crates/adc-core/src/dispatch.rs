//! Command dispatch
//!
//! Turns a control request (verb + target + optional address/value) into
//! registry lookups and device calls, and folds the result into a
//! transport-neutral [`Outcome`]. HTTP handlers and CLI commands both come
//! through here.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::device::{DeviceControl, DeviceError};
use crate::reg::{parse_hex_u16, HexError, RegHex, RegOp, REG_NUM_MASK};
use crate::registry::{DeviceRegistry, RegistryError, ALL_DEVICES};

/// The five control verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Read,
    ReadAll,
    Write,
    StreamStart,
    StreamStop,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Read => "read",
            Verb::ReadAll => "read-all",
            Verb::Write => "write",
            Verb::StreamStart => "stream-start",
            Verb::StreamStop => "stream-stop",
        }
    }

    /// Map an MStream action (`start`/`stop`) to its verb
    pub fn from_stream_action(action: &str) -> Result<Self, DispatchError> {
        match action {
            "start" => Ok(Verb::StreamStart),
            "stop" => Ok(Verb::StreamStop),
            other => Err(DispatchError::UnknownOperation(format!(
                "wrong MStream action {other:?}, must be one of start/stop"
            ))),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Verb::Read),
            "read-all" => Ok(Verb::ReadAll),
            "write" => Ok(Verb::Write),
            "stream-start" => Ok(Verb::StreamStart),
            "stream-stop" => Ok(Verb::StreamStop),
            other => Err(DispatchError::UnknownOperation(format!(
                "unknown command {other:?}, must be one of read/read-all/write/stream-start/stream-stop"
            ))),
        }
    }
}

/// One device by name, or every registered device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Device(String),
    All,
}

impl Target {
    pub fn parse(s: &str) -> Self {
        if s == ALL_DEVICES {
            Target::All
        } else {
            Target::Device(s.to_string())
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Device(name) => f.write_str(name),
            Target::All => f.write_str(ALL_DEVICES),
        }
    }
}

/// A fully formed control command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Read { device: String, addr: u16 },
    ReadAll { device: String },
    Write { device: String, op: RegOp },
    StreamStart { target: Target },
    StreamStop { target: Target },
}

impl Command {
    /// Build a command from request text. This is where malformed requests
    /// are rejected, before any device is looked up.
    pub fn from_request(
        verb: Verb,
        target: &str,
        addr: Option<&str>,
        value: Option<&str>,
    ) -> Result<Self, DispatchError> {
        let target = Target::parse(target);
        let single = |target: Target| match target {
            Target::Device(name) => Ok(name),
            Target::All => Err(DispatchError::InvalidArgument(format!(
                "{verb} needs a single device, not {ALL_DEVICES:?}"
            ))),
        };
        let required = |field: Option<&str>, what: &str| -> Result<u16, DispatchError> {
            let text = field.ok_or_else(|| {
                DispatchError::InvalidArgument(format!("{verb} needs a register {what}"))
            })?;
            parse_hex_u16(text).map_err(DispatchError::from)
        };

        match verb {
            Verb::Read => Ok(Command::Read {
                device: single(target)?,
                addr: required(addr, "address")?,
            }),
            Verb::ReadAll => Ok(Command::ReadAll {
                device: single(target)?,
            }),
            Verb::Write => {
                let device = single(target)?;
                let op = RegOp::write(required(addr, "address")?, required(value, "value")?);
                Ok(Command::Write { device, op })
            }
            Verb::StreamStart => Ok(Command::StreamStart { target }),
            Verb::StreamStop => Ok(Command::StreamStop { target }),
        }
    }

    pub fn verb(&self) -> Verb {
        match self {
            Command::Read { .. } => Verb::Read,
            Command::ReadAll { .. } => Verb::ReadAll,
            Command::Write { .. } => Verb::Write,
            Command::StreamStart { .. } => Verb::StreamStart,
            Command::StreamStop { .. } => Verb::StreamStop,
        }
    }
}

/// Successful command result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Write and streaming commands return nothing
    Empty,
    Register(RegOp),
    /// Registers in the order the device reported them
    Registers(Vec<RegOp>),
}

impl Payload {
    pub fn to_hex(&self) -> Vec<RegHex> {
        match self {
            Payload::Empty => Vec::new(),
            Payload::Register(op) => vec![RegHex::from(op)],
            Payload::Registers(ops) => ops.iter().map(RegHex::from).collect(),
        }
    }
}

/// How a failure should be reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Malformed request; never reached a device
    BadRequest,
    /// Target device is not registered
    NotFound,
    /// The device (or the link to it) failed
    DeviceFailure,
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("Device {device} failed: {source}")]
    Device {
        device: String,
        #[source]
        source: DeviceError,
    },
    /// A broadcast stopped at `device`; devices before it succeeded and the
    /// ones after it were not attempted
    #[error("{verb} stopped at device {device} ({position} of {total}): {source}")]
    Broadcast {
        verb: Verb,
        device: String,
        position: usize,
        total: usize,
        #[source]
        source: DeviceError,
    },
}

impl From<HexError> for DispatchError {
    fn from(e: HexError) -> Self {
        DispatchError::InvalidArgument(e.to_string())
    }
}

impl DispatchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DispatchError::UnknownOperation(_) | DispatchError::InvalidArgument(_) => {
                FailureKind::BadRequest
            }
            DispatchError::Registry(RegistryError::UnknownDevice(_)) => FailureKind::NotFound,
            DispatchError::Registry(_) => FailureKind::BadRequest,
            DispatchError::Device { .. } | DispatchError::Broadcast { .. } => {
                FailureKind::DeviceFailure
            }
        }
    }
}

pub type Outcome = Result<Payload, DispatchError>;

/// Execute a command against the registry
pub fn dispatch(registry: &DeviceRegistry, command: &Command) -> Outcome {
    debug!(verb = %command.verb(), "Dispatching command");
    match command {
        Command::Read { device, addr } => {
            let dev = registry.resolve(device)?;
            let value = dev
                .read_register(*addr)
                .map_err(|e| device_error(device, e))?;
            Ok(Payload::Register(RegOp {
                read: true,
                addr: *addr & REG_NUM_MASK,
                value,
            }))
        }
        Command::ReadAll { device } => {
            let dev = registry.resolve(device)?;
            let ops = dev
                .read_all_registers()
                .map_err(|e| device_error(device, e))?;
            Ok(Payload::Registers(ops))
        }
        Command::Write { device, op } => {
            let dev = registry.resolve(device)?;
            dev.write_register(*op)
                .map_err(|e| device_error(device, e))?;
            Ok(Payload::Empty)
        }
        Command::StreamStart { target } => stream(registry, Verb::StreamStart, target),
        Command::StreamStop { target } => stream(registry, Verb::StreamStop, target),
    }
}

fn stream(registry: &DeviceRegistry, verb: Verb, target: &Target) -> Outcome {
    match target {
        Target::Device(name) => {
            let dev = registry.resolve(name)?;
            stream_one(dev.as_ref(), verb).map_err(|e| device_error(name, e))?;
        }
        Target::All => {
            // Sequential and fail-fast: the first failure ends the broadcast
            let devices = registry.all_devices();
            let total = devices.len();
            for (i, dev) in devices.iter().enumerate() {
                if let Err(source) = stream_one(dev.as_ref(), verb) {
                    warn!(
                        device = dev.name(),
                        verb = %verb,
                        position = i + 1,
                        total,
                        error = %source,
                        "Broadcast aborted"
                    );
                    return Err(DispatchError::Broadcast {
                        verb,
                        device: dev.name().to_string(),
                        position: i + 1,
                        total,
                        source,
                    });
                }
            }
        }
    }
    Ok(Payload::Empty)
}

fn stream_one(dev: &dyn DeviceControl, verb: Verb) -> Result<(), DeviceError> {
    match verb {
        Verb::StreamStart => dev.start_streaming()?,
        Verb::StreamStop => dev.stop_streaming()?,
        Verb::Read | Verb::ReadAll | Verb::Write => {
            return Err(DeviceError::Protocol(format!("{verb} is not a streaming verb")))
        }
    }
    info!(device = dev.name(), verb = %verb, "MStream state changed");
    Ok(())
}

fn device_error(device: &str, source: DeviceError) -> DispatchError {
    warn!(device = device, error = %source, "Device command failed");
    DispatchError::Device {
        device: device.to_string(),
        source,
    }
}
