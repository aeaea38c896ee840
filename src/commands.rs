//! AT commands the gateway sends to the Wio-E5.
//!
//! Each command knows its text and the line that acknowledges it, so it can be turned
//! into a [`CommandRequest`] for the sequencer. The module is only driven in LoRa test
//! mode:
//!
//! - `AT` liveness probe
//! - `AT+MODE=TEST` switch to test mode
//! - `AT+TEST=RFCFG,...` radio parameters
//! - `AT+TEST=RXLRPKT` continuous receive
//! - `AT+TEST=TXLRPKT,"..."` node status transmission

use std::time::Duration;

use crate::config::RadioConfig;
use crate::constants::{
    ACK_MODE_TEST, ACK_PROBE, ACK_TEST_RFCFG, ACK_TEST_RXLRPKT, ACK_TEST_TXLRPKT, AT_MODE_TEST,
    AT_PROBE, AT_TEST_RXLRPKT, AT_TEST_TXLRPKT, PAYLOAD_QUOTE,
};
use crate::link::sequencer::{Acceptance, CommandRequest};
use crate::util::hex::encode_hex_upper;

#[derive(Debug, Clone, PartialEq)]
pub enum AtCommand {
    /// Check the module answers at all.
    Probe,

    /// Enter LoRa test mode.
    ModeTest,

    /// Apply radio parameters.
    RadioConfig(RadioConfig),

    /// Listen continuously for packets.
    ReceiveMode,

    /// Transmit a status frame addressed to one node.
    NodeStatus {
        node_id: u8,
        /// Fixed bytes following the node id.
        follow_up: [u8; 2],
    },

    /// Any other command with a caller-chosen acknowledgement marker.
    Raw { text: String, ack: String },
}

impl AtCommand {
    /// Commands that bring a freshly powered module into continuous receive
    pub fn setup_sequence(radio: &RadioConfig) -> Vec<AtCommand> {
        vec![
            AtCommand::Probe,
            AtCommand::ModeTest,
            AtCommand::RadioConfig(radio.clone()),
            AtCommand::ReceiveMode,
        ]
    }

    /// Command text as written to the module, without terminator
    pub fn to_command_string(&self) -> String {
        match self {
            AtCommand::Probe => AT_PROBE.to_string(),
            AtCommand::ModeTest => AT_MODE_TEST.to_string(),
            AtCommand::RadioConfig(radio) => radio.rfcfg_command(),
            AtCommand::ReceiveMode => AT_TEST_RXLRPKT.to_string(),
            AtCommand::NodeStatus { node_id, follow_up } => {
                let payload = encode_hex_upper(&[*node_id, follow_up[0], follow_up[1]]);
                format!("{AT_TEST_TXLRPKT},{PAYLOAD_QUOTE}{payload}{PAYLOAD_QUOTE}")
            }
            AtCommand::Raw { text, .. } => text.clone(),
        }
    }

    /// Marker a line must contain to acknowledge this command
    pub fn ack_marker(&self) -> &str {
        match self {
            AtCommand::Probe => ACK_PROBE,
            AtCommand::ModeTest => ACK_MODE_TEST,
            AtCommand::RadioConfig(_) => ACK_TEST_RFCFG,
            AtCommand::ReceiveMode => ACK_TEST_RXLRPKT,
            AtCommand::NodeStatus { .. } => ACK_TEST_TXLRPKT,
            AtCommand::Raw { ack, .. } => ack,
        }
    }

    pub fn request(&self, timeout: Duration) -> CommandRequest {
        CommandRequest::new(self.to_command_string(), Acceptance::contains(self.ack_marker()))
            .with_timeout(timeout)
    }
}
