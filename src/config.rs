//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use crate::error::{Result, UwbBridgeError};
use crate::radio::frame::is_broadcast;
use crate::radio::RadioSettings;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub node: NodeConfig,
    pub ranging: RangingConfig,
    pub radio: RadioConfig,
    pub serial: SerialConfig,
    pub telemetry: TelemetryConfig,
}

/// Node identity
#[derive(Debug, Deserialize, Clone)]
pub struct NodeConfig {
    #[serde(default = "default_address")]
    pub address: u8,

    /// Node that never initiates ranging; everyone else polls it
    #[serde(default = "default_anchor_address")]
    pub anchor_address: u8,

    /// Broadcast PING period, 0 disables discovery
    #[serde(default = "default_discovery_interval_ms")]
    pub discovery_interval_ms: u64,
}

/// DS-TWR configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RangingConfig {
    #[serde(default = "default_ranging_enabled")]
    pub enabled: bool,

    #[serde(default = "default_poll_interval_us")]
    pub poll_interval_us: u64,

    /// Antenna delay correction subtracted from every distance
    #[serde(default)]
    pub calibration_offset_m: f64,
}

/// Radio configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RadioConfig {
    #[serde(default = "default_channel")]
    pub channel: u8,

    #[serde(default = "default_preamble_code")]
    pub preamble_code: u8,

    #[serde(default = "default_radio_mode")]
    pub mode: String,

    /// Local socket of the UDP radio
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Nodes "in range" of the UDP radio
    #[serde(default)]
    pub peers: Vec<SocketAddr>,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

/// Telemetry configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

/// Channels supported by the transceiver
const VALID_CHANNELS: &[u8] = &[1, 2, 3, 4, 5, 7];

const VALID_BAUD_RATES: &[u32] = &[9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600];

// Default value functions
fn default_address() -> u8 { 2 }
fn default_anchor_address() -> u8 { 1 }
fn default_discovery_interval_ms() -> u64 { 5000 }

fn default_ranging_enabled() -> bool { true }
fn default_poll_interval_us() -> u64 { 100_000 }

fn default_channel() -> u8 { 5 }
fn default_preamble_code() -> u8 { 4 }
fn default_radio_mode() -> String { "short_data_fast_accuracy".to_string() }
fn default_bind() -> SocketAddr { SocketAddr::from(([0, 0, 0, 0], 47000)) }

fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 115200 }

fn default_telemetry_enabled() -> bool { true }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

fn invalid(message: impl std::fmt::Display) -> UwbBridgeError {
    UwbBridgeError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use uwb_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// PHY parameters handed to the radio driver
    pub fn radio_settings(&self) -> RadioSettings {
        RadioSettings {
            channel: self.radio.channel,
            preamble_code: self.radio.preamble_code,
            mode: self.radio.mode.clone(),
        }
    }

    /// Returns `true` if this node starts ranging exchanges
    pub fn is_initiator(&self) -> bool {
        self.ranging.enabled && self.node.address != self.node.anchor_address
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        // Node addressing
        if is_broadcast(self.node.address) {
            return Err(invalid("node address cannot be a broadcast address (0 or 255)"));
        }

        if is_broadcast(self.node.anchor_address) {
            return Err(invalid("anchor_address cannot be a broadcast address (0 or 255)"));
        }

        if self.node.discovery_interval_ms != 0
            && !(100..=3_600_000).contains(&self.node.discovery_interval_ms)
        {
            return Err(invalid("discovery_interval_ms must be 0 or between 100 and 3600000"));
        }

        // Ranging
        if self.ranging.poll_interval_us == 0 || self.ranging.poll_interval_us > 60_000_000 {
            return Err(invalid("poll_interval_us must be between 1 and 60000000"));
        }

        if !self.ranging.calibration_offset_m.is_finite()
            || self.ranging.calibration_offset_m.abs() > 1000.0
        {
            return Err(invalid("calibration_offset_m must be a finite value within ±1000"));
        }

        // Radio
        if !VALID_CHANNELS.contains(&self.radio.channel) {
            return Err(invalid(format!(
                "channel must be one of {:?}, got {}",
                VALID_CHANNELS, self.radio.channel
            )));
        }

        if self.radio.preamble_code == 0 || self.radio.preamble_code > 24 {
            return Err(invalid("preamble_code must be between 1 and 24"));
        }

        if self.radio.mode.is_empty() {
            return Err(invalid("radio mode cannot be empty"));
        }

        // Serial
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if !VALID_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of {:?}, got {}",
                VALID_BAUD_RATES, self.serial.baud_rate
            )));
        }

        // Telemetry
        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        Ok(())
    }
}
