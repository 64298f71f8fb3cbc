//! Application state management

use adc_core::{DeviceControl, DeviceRegistry, MemoryDevice};
use adc_mlink::{MLinkDevice, MLinkTransport};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{Config, DeviceConfig, TransportKind};

/// Shared application state
pub struct AppState {
    /// Devices by name; fixed after startup
    pub registry: DeviceRegistry,
}

impl AppState {
    /// Create new application state
    pub fn new(config: &Config) -> Result<Arc<Self>> {
        let registry = build_registry(config)?;
        info!(devices = ?registry.names(), "Device registry ready");
        Ok(Arc::new(Self { registry }))
    }
}

/// Open a control handle for every configured device
pub fn build_registry(config: &Config) -> Result<DeviceRegistry> {
    let mut registry = DeviceRegistry::new();
    for dev in &config.devices {
        let handle = open_device(config, dev)
            .with_context(|| format!("opening device {}", dev.name))?;
        registry.insert(handle)?;
    }
    Ok(registry)
}

fn open_device(config: &Config, dev: &DeviceConfig) -> Result<Arc<dyn DeviceControl>> {
    match dev.transport {
        TransportKind::Memory => {
            debug!(device = %dev.name, "Using in-memory device");
            let regs = dev.register_map().into_iter().map(|addr| (addr, 0));
            Ok(Arc::new(MemoryDevice::new(&dev.name).with_registers(regs)))
        }
        TransportKind::Mlink => {
            let ip = dev
                .ip
                .with_context(|| format!("device {} has no ip address", dev.name))?;
            let target = SocketAddr::new(ip, dev.port.unwrap_or(config.mlink.port));
            let transport =
                MLinkTransport::connect(target, config.mlink.timeout_ms, config.mlink.host_id)?;
            debug!(device = %dev.name, target = %target, "Using MLink device");
            Ok(Arc::new(MLinkDevice::new(
                &dev.name,
                transport,
                dev.register_map(),
                config.mstream.to_control(),
            )))
        }
    }
}
