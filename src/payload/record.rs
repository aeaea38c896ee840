//! Node record carried by a received LoRa packet

use serde::{Deserialize, Serialize};

use crate::constants::{PACKET_BYTES, PARAM_COUNT, PAYLOAD_QUOTE, RX_LINE_PREFIX};
use crate::util::hex::encode_hex_upper;

/// Latest state reported by one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Identifies the node; 0 is reserved for empty registry slots
    pub node_id: u8,
    /// Message type the node answered with
    pub response_id: u8,
    pub params: [u8; PARAM_COUNT],
}

impl NodeRecord {
    pub fn new(response_id: u8, node_id: u8, params: [u8; PARAM_COUNT]) -> Self {
        NodeRecord {
            node_id,
            response_id,
            params,
        }
    }

    /// Build a record from its wire byte order: response id, node id, parameters.
    pub fn from_bytes(bytes: [u8; PACKET_BYTES]) -> Self {
        let mut params = [0u8; PARAM_COUNT];
        params.copy_from_slice(&bytes[2..]);
        NodeRecord {
            node_id: bytes[1],
            response_id: bytes[0],
            params,
        }
    }

    pub fn to_bytes(&self) -> [u8; PACKET_BYTES] {
        let mut bytes = [0u8; PACKET_BYTES];
        bytes[0] = self.response_id;
        bytes[1] = self.node_id;
        bytes[2..].copy_from_slice(&self.params);
        bytes
    }

    /// The 16 uppercase hex digits carried inside a data line
    pub fn to_hex(&self) -> String {
        encode_hex_upper(&self.to_bytes())
    }

    /// The full line the radio module prints when it receives this record
    pub fn to_rx_line(&self) -> String {
        format!(
            "{RX_LINE_PREFIX}{PAYLOAD_QUOTE}{}{PAYLOAD_QUOTE}",
            self.to_hex()
        )
    }
}
