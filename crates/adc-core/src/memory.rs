//! In-memory device backend
//!
//! Keeps a register file in process memory. Used for dry runs without
//! hardware (`transport = "memory"` in the config) and as the test double for
//! dispatcher and API tests. Individual verbs can be made to fail so error
//! paths are reachable.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::device::{DeviceControl, DeviceError};
use crate::dispatch::Verb;
use crate::reg::{RegOp, REG_NUM_MASK};

#[derive(Debug, Default)]
struct MemoryState {
    /// Register file in device order
    registers: Vec<(u16, u16)>,
    streaming: bool,
    calls: Vec<Verb>,
    faults: HashSet<Verb>,
}

pub struct MemoryDevice {
    name: String,
    state: Mutex<MemoryState>,
}

impl MemoryDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Define registers with initial values, in the order `read_all_registers`
    /// reports them
    pub fn with_registers(self, regs: impl IntoIterator<Item = (u16, u16)>) -> Self {
        {
            let mut state = self.lock();
            for (addr, value) in regs {
                set_register(&mut state.registers, addr & REG_NUM_MASK, value);
            }
        }
        self
    }

    /// Make every call of `verb` fail with a communication error
    pub fn fail_on(self, verb: Verb) -> Self {
        self.lock().faults.insert(verb);
        self
    }

    /// Verbs invoked so far, oldest first
    pub fn calls(&self) -> Vec<Verb> {
        self.lock().calls.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.lock().streaming
    }

    pub fn register(&self, addr: u16) -> Option<u16> {
        let addr = addr & REG_NUM_MASK;
        self.lock()
            .registers
            .iter()
            .find(|(a, _)| *a == addr)
            .map(|(_, v)| *v)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the call and apply any injected fault
    fn enter(&self, verb: Verb) -> Result<MutexGuard<'_, MemoryState>, DeviceError> {
        let mut state = self.lock();
        state.calls.push(verb);
        if state.faults.contains(&verb) {
            debug!(device = %self.name, verb = %verb, "Injected device fault");
            return Err(DeviceError::Protocol(format!(
                "injected {verb} fault on {}",
                self.name
            )));
        }
        Ok(state)
    }
}

fn set_register(regs: &mut Vec<(u16, u16)>, addr: u16, value: u16) {
    match regs.iter_mut().find(|(a, _)| *a == addr) {
        Some(slot) => slot.1 = value,
        None => regs.push((addr, value)),
    }
}

impl DeviceControl for MemoryDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_register(&self, addr: u16) -> Result<u16, DeviceError> {
        let state = self.enter(Verb::Read)?;
        let addr = addr & REG_NUM_MASK;
        let value = state
            .registers
            .iter()
            .find(|(a, _)| *a == addr)
            .map(|(_, v)| *v);
        value.ok_or_else(|| DeviceError::Rejected(format!("register 0x{addr:04x} is not defined")))
    }

    fn read_all_registers(&self) -> Result<Vec<RegOp>, DeviceError> {
        let state = self.enter(Verb::ReadAll)?;
        Ok(state
            .registers
            .iter()
            .map(|&(addr, value)| RegOp {
                read: true,
                addr,
                value,
            })
            .collect())
    }

    fn write_register(&self, op: RegOp) -> Result<(), DeviceError> {
        let mut state = self.enter(Verb::Write)?;
        if op.read {
            return Err(DeviceError::Protocol(
                "write_register called with a read operation".to_string(),
            ));
        }
        set_register(&mut state.registers, op.addr & REG_NUM_MASK, op.value);
        Ok(())
    }

    fn start_streaming(&self) -> Result<(), DeviceError> {
        let mut state = self.enter(Verb::StreamStart)?;
        state.streaming = true;
        Ok(())
    }

    fn stop_streaming(&self) -> Result<(), DeviceError> {
        let mut state = self.enter(Verb::StreamStop)?;
        state.streaming = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registers_keep_definition_order() {
        let dev = MemoryDevice::new("adc0").with_registers([(0x10, 1), (0x02, 2), (0x7f, 3)]);
        let addrs: Vec<u16> = dev
            .read_all_registers()
            .unwrap()
            .iter()
            .map(|op| op.addr)
            .collect();
        assert_eq!(addrs, vec![0x10, 0x02, 0x7f]);
    }

    #[test]
    fn test_write_then_read() {
        let dev = MemoryDevice::new("adc0").with_registers([(1, 0)]);
        dev.write_register(RegOp::write(1, 0xabcd)).unwrap();
        assert_eq!(dev.read_register(1).unwrap(), 0xabcd);
        assert!(dev.read_register(2).is_err());
    }

    #[test]
    fn test_fault_injection_and_call_log() {
        let dev = MemoryDevice::new("adc0").fail_on(Verb::StreamStart);
        assert!(dev.start_streaming().is_err());
        assert!(!dev.is_streaming());
        dev.stop_streaming().unwrap();
        assert_eq!(dev.calls(), vec![Verb::StreamStart, Verb::StreamStop]);
    }
}
