//! Configuration for a PZEM-017 connection.

use pzem_common::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::registers::GENERAL_ADDRESS;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] pzem_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete device configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Serial line settings
    pub serial: SerialConfig,

    /// Modbus slave address (1-247, or 248 for the general address)
    #[serde(default = "default_slave_address")]
    pub slave_address: u8,

    /// Readings younger than this are served from the cache
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    /// Response timeout for a single transaction
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_slave_address() -> u8 {
    GENERAL_ADDRESS
}

fn default_update_interval_ms() -> u64 {
    200
}

fn default_timeout_ms() -> u64 {
    1000
}

/// Serial line settings. Defaults are the meter's factory 9600 8N2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0" or "COM1")
    pub port: String,
    /// Baud rate (default: 9600)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Data bits (default: 8)
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Parity: "none", "even", or "odd" (default: "none")
    #[serde(default = "default_parity")]
    pub parity: String,
    /// Stop bits: 1 or 2 (default: 2)
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    2
}

impl SerialConfig {
    /// Settings for `port` with every other field at its default.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            parity: default_parity(),
            stop_bits: default_stop_bits(),
        }
    }

    /// Build a serial port builder from these settings.
    pub fn builder(&self) -> tokio_serial::SerialPortBuilder {
        let parity = match self.parity.to_lowercase().as_str() {
            "even" => tokio_serial::Parity::Even,
            "odd" => tokio_serial::Parity::Odd,
            _ => tokio_serial::Parity::None,
        };

        let stop_bits = match self.stop_bits {
            1 => tokio_serial::StopBits::One,
            _ => tokio_serial::StopBits::Two,
        };

        let data_bits = match self.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        };

        tokio_serial::new(&self.port, self.baud_rate)
            .parity(parity)
            .stop_bits(stop_bits)
            .data_bits(data_bits)
    }
}

impl DeviceConfig {
    /// Load and validate configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: DeviceConfig = pzem_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: DeviceConfig = pzem_common::parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let serial = &self.serial;

        if serial.port.is_empty() {
            return Err(ConfigError::Validation(
                "Serial port cannot be empty".to_string(),
            ));
        }

        if serial.baud_rate == 0 {
            return Err(ConfigError::Validation(format!(
                "Port '{}': baud_rate must be positive",
                serial.port
            )));
        }

        match serial.parity.to_lowercase().as_str() {
            "none" | "even" | "odd" => {}
            _ => {
                return Err(ConfigError::Validation(format!(
                    "Port '{}': invalid parity '{}' (use none, even, or odd)",
                    serial.port, serial.parity
                )));
            }
        }

        if !(5..=8).contains(&serial.data_bits) {
            return Err(ConfigError::Validation(format!(
                "Port '{}': data_bits must be 5-8",
                serial.port
            )));
        }

        if !matches!(serial.stop_bits, 1 | 2) {
            return Err(ConfigError::Validation(format!(
                "Port '{}': stop_bits must be 1 or 2",
                serial.port
            )));
        }

        if self.slave_address == 0 || self.slave_address > GENERAL_ADDRESS {
            return Err(ConfigError::Validation(format!(
                "slave_address must be 1-247 or 248, got {}",
                self.slave_address
            )));
        }

        if self.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "timeout_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
