//! # Gateway Error Handling
//!
//! This module defines the GatewayError enum, which wraps the errors raised by the
//! individual gateway components so callers can propagate any of them with `?`.

use thiserror::Error;

use crate::config::ConfigError;
use crate::link::sequencer::SequencerError;
use crate::payload::packet::PacketError;
use crate::registry::RegistryError;

/// Represents the different error types that can occur in the gateway crate.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The command sequencer refused or failed to issue a command.
    #[error("Command error: {0}")]
    Sequencer(#[from] SequencerError),

    /// No acceptable response arrived before the command deadline.
    #[error("Command timed out: {command}")]
    CommandTimeout { command: String },

    /// A data line could not be decoded into a node record.
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    /// The node registry rejected an update.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Indicates an error related to the serial port communication.
    #[error("Serial port error: {0}")]
    SerialPortError(String),

    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The byte-delivery side of the line queue has gone away.
    #[error("Line queue closed")]
    QueueClosed,
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::SerialPortError(e.to_string())
    }
}
