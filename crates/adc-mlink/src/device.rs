//! Register control of a device over MLink

use adc_core::{DeviceControl, DeviceError, RegFrame, RegOp, REG_NUM_MASK};
use tracing::debug;

use crate::frame::MAX_OPS_PER_FRAME;
use crate::transport::MLinkTransport;

/// Where and how the MStream (streaming) mode is switched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MStreamControl {
    /// Control register address
    pub reg: u16,
    /// Value written to start streaming
    pub start: u16,
    /// Value written to stop streaming
    pub stop: u16,
}

impl Default for MStreamControl {
    fn default() -> Self {
        Self {
            reg: 0x0040,
            start: 0x0001,
            stop: 0x0000,
        }
    }
}

pub struct MLinkDevice {
    name: String,
    transport: MLinkTransport,
    /// Register map reported by `read_all_registers`, in order
    registers: Vec<u16>,
    mstream: MStreamControl,
}

impl MLinkDevice {
    pub fn new(
        name: impl Into<String>,
        transport: MLinkTransport,
        registers: Vec<u16>,
        mstream: MStreamControl,
    ) -> Self {
        Self {
            name: name.into(),
            transport,
            registers,
            mstream,
        }
    }

    fn exchange(&self, ops: Vec<RegOp>) -> Result<Vec<RegOp>, DeviceError> {
        let sent = ops.len();
        let resp = self.transport.transceive(&RegFrame::new(ops))?;
        if resp.ops.len() != sent {
            return Err(DeviceError::Protocol(format!(
                "sent {sent} register operations, device answered {}",
                resp.ops.len()
            )));
        }
        Ok(resp.ops)
    }
}

impl DeviceControl for MLinkDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_register(&self, addr: u16) -> Result<u16, DeviceError> {
        let addr = addr & REG_NUM_MASK;
        let resp = self.exchange(vec![RegOp::read(addr)])?;
        match resp.first() {
            Some(op) if op.addr == addr => Ok(op.value),
            Some(op) => Err(DeviceError::Protocol(format!(
                "asked for register 0x{addr:04x}, device answered 0x{:04x}",
                op.addr
            ))),
            None => Err(DeviceError::Protocol("empty response".to_string())),
        }
    }

    fn read_all_registers(&self) -> Result<Vec<RegOp>, DeviceError> {
        let mut out = Vec::with_capacity(self.registers.len());
        for chunk in self.registers.chunks(MAX_OPS_PER_FRAME) {
            let request: Vec<RegOp> = chunk.iter().map(|&a| RegOp::read(a)).collect();
            let resp = self.exchange(request)?;
            for (&addr, op) in chunk.iter().zip(resp) {
                if op.addr != addr & REG_NUM_MASK {
                    return Err(DeviceError::Protocol(format!(
                        "register 0x{:04x} answered out of order (expected 0x{addr:04x})",
                        op.addr
                    )));
                }
                out.push(RegOp {
                    read: true,
                    addr: op.addr,
                    value: op.value,
                });
            }
        }
        debug!(device = %self.name, count = out.len(), "Read register map");
        Ok(out)
    }

    fn write_register(&self, op: RegOp) -> Result<(), DeviceError> {
        if op.read {
            return Err(DeviceError::Protocol(
                "write_register called with a read operation".to_string(),
            ));
        }
        let resp = self.exchange(vec![op])?;
        match resp.first() {
            Some(ack) if !ack.read && ack.addr == op.addr & REG_NUM_MASK => Ok(()),
            _ => Err(DeviceError::Rejected(format!(
                "write to register 0x{:04x} not acknowledged",
                op.addr
            ))),
        }
    }

    fn start_streaming(&self) -> Result<(), DeviceError> {
        self.write_register(RegOp::write(self.mstream.reg, self.mstream.start))
    }

    fn stop_streaming(&self) -> Result<(), DeviceError> {
        self.write_register(RegOp::write(self.mstream.reg, self.mstream.stop))
    }
}
