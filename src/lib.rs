//! # e5-gateway - Command/Response Engine for a Wio-E5 LoRa Gateway
//!
//! The e5-gateway crate drives a Seeed Wio-E5 module over its AT serial interface and
//! keeps track of the sensor nodes it hears.
//!
//! ## Features
//!
//! - Frame the module's `+...\n` response lines from a byte stream, one byte at a time
//! - Hand completed lines from the serial read side to a polling context without blocking
//! - Issue AT commands one at a time and match each with its response or a timeout
//! - Decode received-packet lines (`+TEST: RX "591011BA141F172F"`) into node records
//! - Keep the latest record of each node in a fixed-capacity registry
//! - Configure the module's LoRa test mode from a JSON configuration
//!
//! ## Usage
//!
//! ```rust,no_run
//! use e5_gateway::{connect, init_logger, GatewayConfig, GatewayEvent};
//!
//! # async fn run() -> Result<(), e5_gateway::GatewayError> {
//! init_logger();
//! let (mut gateway, _reader) = connect("/dev/ttyUSB0", GatewayConfig::default()).await?;
//! loop {
//!     for event in gateway.next_events().await? {
//!         if let GatewayEvent::NodeUpdated { slot, record } = event {
//!             println!("slot {slot}: {}", record.to_hex());
//!         }
//!     }
//! }
//! # }
//! ```

pub mod commands;
pub mod config;
pub mod constants;
pub mod error;
pub mod gateway;
pub mod link;
pub mod logging;
pub mod payload;
pub mod registry;
pub mod util;

pub use crate::commands::AtCommand;
pub use crate::config::{ConfigError, GatewayConfig, RadioConfig};
pub use crate::error::GatewayError;
pub use crate::gateway::{Gateway, GatewayEvent, GatewayStats};
pub use crate::link::{
    line_queue, Acceptance, ByteSink, CommandHandle, CommandOutcome, CommandRequest,
    CommandSequencer, FrameError, Line, LineFramer, LineReceiver, LineRoute, SequencerError,
    Transport,
};
pub use crate::logging::{init_logger, log_info};
pub use crate::payload::{parse_packet, NodeRecord, PacketError};
pub use crate::registry::{NodeRegistry, RegistryError, RegistrySnapshot, SharedRegistry, SlotIndex};

use std::io;

use tokio::task::JoinHandle;

use crate::link::transport::SerialTransport;

/// Open the Wio-E5 on `port` and bring it into continuous receive.
///
/// # Arguments
/// * `port` - Serial port path (e.g., "/dev/ttyUSB0" on Linux, "COM3" on Windows)
/// * `config` - Gateway settings, including baud rate and radio parameters
///
/// # Returns
/// * `Ok((Gateway, JoinHandle))` - Configured gateway and the task reading the port
/// * `Err(GatewayError)` - The port could not be opened or the module did not answer
pub async fn connect(
    port: &str,
    config: GatewayConfig,
) -> Result<(Gateway<SerialTransport>, JoinHandle<io::Result<u64>>), GatewayError> {
    let (mut gateway, reader) = Gateway::open_serial(port, config)?;
    if let Err(e) = gateway.configure_radio().await {
        reader.abort();
        return Err(e);
    }
    Ok((gateway, reader))
}

/// Transmit a status frame to `node_id` and wait for the module to confirm it.
///
/// # Returns
/// * `Ok(Line)` - The module's transmit acknowledgement
/// * `Err(GatewayError)` - Busy, write failure or timeout
pub async fn send_node_status<T: Transport>(
    gateway: &mut Gateway<T>,
    node_id: u8,
) -> Result<Line, GatewayError> {
    let command = AtCommand::NodeStatus {
        node_id,
        follow_up: gateway.config().status_follow_up,
    };
    let request = command.request(gateway.config().command_timeout);
    gateway.execute(request).await
}
