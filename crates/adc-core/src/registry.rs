//! Device registry - maps logical device names to control handles

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::device::DeviceControl;

/// Target name that addresses every registered device
pub const ALL_DEVICES: &str = "all";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Device not found: {0}")]
    UnknownDevice(String),
    #[error("Device already registered: {0}")]
    DuplicateDevice(String),
    #[error("Device name {0:?} is reserved")]
    ReservedName(String),
}

/// Name → handle lookup, filled once at startup and read-only afterwards.
///
/// Handles are shared behind `Arc`, so the registry itself can be shared
/// across request handlers without locking.
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<Arc<dyn DeviceControl>>,
    by_name: HashMap<String, usize>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, device: Arc<dyn DeviceControl>) -> Result<(), RegistryError> {
        let name = device.name().to_string();
        if name == ALL_DEVICES {
            return Err(RegistryError::ReservedName(name));
        }
        if self.by_name.contains_key(&name) {
            return Err(RegistryError::DuplicateDevice(name));
        }
        self.by_name.insert(name, self.devices.len());
        self.devices.push(device);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn DeviceControl>, RegistryError> {
        self.by_name
            .get(name)
            .map(|&i| self.devices[i].clone())
            .ok_or_else(|| RegistryError::UnknownDevice(name.to_string()))
    }

    /// Every device, in registration order
    pub fn all_devices(&self) -> Vec<Arc<dyn DeviceControl>> {
        self.devices.clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.names())
            .finish()
    }
}
