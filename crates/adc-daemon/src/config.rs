//! Configuration loading and validation

use adc_mlink::{MStreamControl, DEFAULT_HOST_ID, DEFAULT_TIMEOUT_MS, MLINK_PORT};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub mlink: MLinkConfig,
    #[serde(default)]
    pub mstream: MStreamConfig,
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP API
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLinkConfig {
    /// Device-side UDP port
    #[serde(default = "default_mlink_port")]
    pub port: u16,
    /// Response timeout per request
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Source id placed in request headers
    #[serde(default = "default_host_id")]
    pub host_id: u16,
}

impl Default for MLinkConfig {
    fn default() -> Self {
        Self {
            port: default_mlink_port(),
            timeout_ms: default_timeout_ms(),
            host_id: default_host_id(),
        }
    }
}

fn default_mlink_port() -> u16 {
    MLINK_PORT
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_host_id() -> u16 {
    DEFAULT_HOST_ID
}

/// MStream control register, shared by all devices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MStreamConfig {
    #[serde(default = "default_control_reg")]
    pub control_reg: u16,
    #[serde(default = "default_start_value")]
    pub start_value: u16,
    #[serde(default)]
    pub stop_value: u16,
}

impl Default for MStreamConfig {
    fn default() -> Self {
        let ctl = MStreamControl::default();
        Self {
            control_reg: ctl.reg,
            start_value: ctl.start,
            stop_value: ctl.stop,
        }
    }
}

fn default_control_reg() -> u16 {
    MStreamControl::default().reg
}

fn default_start_value() -> u16 {
    MStreamControl::default().start
}

impl MStreamConfig {
    pub fn to_control(&self) -> MStreamControl {
        MStreamControl {
            reg: self.control_reg,
            start: self.start_value,
            stop: self.stop_value,
        }
    }
}

/// How the daemon talks to a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// MLink over UDP
    #[default]
    Mlink,
    /// In-process register file, no hardware
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Logical device name used in commands
    pub name: String,
    /// Device IP address (required for MLink devices)
    #[serde(default)]
    pub ip: Option<IpAddr>,
    /// Override for the MLink port
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub transport: TransportKind,
    /// Register map reported by read-all; defaults to 0x0000..=0x003f
    #[serde(default)]
    pub registers: Option<Vec<u16>>,
}

impl DeviceConfig {
    pub fn register_map(&self) -> Vec<u16> {
        self.registers
            .clone()
            .unwrap_or_else(|| (0x0000..=0x003f).collect())
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(
            path = %path.display(),
            devices = config.devices.len(),
            "Loaded configuration"
        );
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
