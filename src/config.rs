//! # Gateway Configuration
//!
//! Sizes, timeouts and radio parameters for one gateway instance. Every field has a
//! default matching the reference Wio-E5 deployment, so a configuration file only needs
//! to name what it changes:
//!
//! ```json
//! { "node_capacity": 8, "radio": { "frequency_mhz": 915 } }
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    AT_TEST_RFCFG, DEFAULT_COMMAND_TIMEOUT, DEFAULT_LINE_QUEUE_DEPTH, DEFAULT_MAX_LINE_LEN,
    DEFAULT_NODE_CAPACITY, DEFAULT_STATUS_FOLLOW_UP, PAYLOAD_HEX_LEN,
};
use crate::link::transport::{duration_ms, SerialConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// LoRa test-mode radio parameters (`AT+TEST=RFCFG`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub frequency_mhz: u32,
    pub spreading_factor: u8,
    pub bandwidth_khz: u16,
    pub tx_preamble: u16,
    pub rx_preamble: u16,
    pub tx_power_dbm: i8,
    pub crc: bool,
    pub iq_inverted: bool,
    pub public_network: bool,
}

impl Default for RadioConfig {
    fn default() -> Self {
        RadioConfig {
            frequency_mhz: 868,
            spreading_factor: 12,
            bandwidth_khz: 125,
            tx_preamble: 12,
            rx_preamble: 15,
            tx_power_dbm: 14,
            crc: true,
            iq_inverted: false,
            public_network: false,
        }
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "ON"
    } else {
        "OFF"
    }
}

impl RadioConfig {
    /// Full `AT+TEST=RFCFG,...` command for these parameters
    pub fn rfcfg_command(&self) -> String {
        format!(
            "{AT_TEST_RFCFG},{},SF{},{},{},{},{},{},{},{}",
            self.frequency_mhz,
            self.spreading_factor,
            self.bandwidth_khz,
            self.tx_preamble,
            self.rx_preamble,
            self.tx_power_dbm,
            on_off(self.crc),
            on_off(self.iq_inverted),
            on_off(self.public_network),
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(7..=12).contains(&self.spreading_factor) {
            return Err(ConfigError::Invalid(format!(
                "spreading factor SF{} outside SF7..SF12",
                self.spreading_factor
            )));
        }
        if ![125, 250, 500].contains(&self.bandwidth_khz) {
            return Err(ConfigError::Invalid(format!(
                "bandwidth {} kHz not one of 125, 250, 500",
                self.bandwidth_khz
            )));
        }
        Ok(())
    }
}

/// Settings for one gateway instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Longest accepted line in bytes, start marker included
    pub max_line_len: usize,
    /// Completed lines buffered between the byte and polling contexts
    pub line_queue_depth: usize,
    pub node_capacity: usize,
    #[serde(rename = "command_timeout_ms", with = "duration_ms")]
    pub command_timeout: Duration,
    /// Attempts per radio setup command before giving up
    pub setup_attempts: u32,
    /// Fixed bytes sent after the node id in a node status command
    pub status_follow_up: [u8; 2],
    pub radio: RadioConfig,
    pub serial: SerialConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            max_line_len: DEFAULT_MAX_LINE_LEN,
            line_queue_depth: DEFAULT_LINE_QUEUE_DEPTH,
            node_capacity: DEFAULT_NODE_CAPACITY,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            setup_attempts: 3,
            status_follow_up: DEFAULT_STATUS_FOLLOW_UP,
            radio: RadioConfig::default(),
            serial: SerialConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: GatewayConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // A data line needs room for its prefix, quotes and the hex payload.
        if self.max_line_len < PAYLOAD_HEX_LEN + 2 {
            return Err(ConfigError::Invalid(format!(
                "max_line_len {} cannot hold a {}-digit payload",
                self.max_line_len, PAYLOAD_HEX_LEN
            )));
        }
        if self.line_queue_depth == 0 {
            return Err(ConfigError::Invalid("line_queue_depth must be positive".into()));
        }
        if self.node_capacity == 0 {
            return Err(ConfigError::Invalid("node_capacity must be positive".into()));
        }
        if self.command_timeout.is_zero() {
            return Err(ConfigError::Invalid("command timeout must be positive".into()));
        }
        if self.setup_attempts == 0 {
            return Err(ConfigError::Invalid("setup_attempts must be positive".into()));
        }
        self.radio.validate()
    }
}
