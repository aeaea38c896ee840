//! Wio-E5 Gateway Constants
//!
//! This module defines the framing markers, payload geometry, default sizes and the
//! AT command vocabulary used when driving a Wio-E5 module in LoRa test mode.

use std::time::Duration;

/// Byte that opens every line emitted by the radio module
pub const START_MARKER: u8 = b'+';

/// Byte that terminates a line
pub const END_MARKER: u8 = b'\n';

/// Carriage return the module sends before the end marker
pub const CARRIAGE_RETURN: u8 = b'\r';

/// Terminator appended to every command written to the module
pub const LINE_TERMINATOR: &str = "\r\n";

/// Quote character delimiting the hex payload of a data line
pub const PAYLOAD_QUOTE: char = '"';

/// Number of parameter bytes carried by a node packet
pub const PARAM_COUNT: usize = 6;

/// Number of encoded bytes in a node packet (response id, node id, parameters)
pub const PACKET_BYTES: usize = 2 + PARAM_COUNT;

/// Number of hex characters a data line must carry
pub const PAYLOAD_HEX_LEN: usize = PACKET_BYTES * 2;

/// Node id reserved for unoccupied registry slots
pub const EMPTY_NODE_ID: u8 = 0;

/// Default maximum line length in bytes, start marker included
pub const DEFAULT_MAX_LINE_LEN: usize = 128;

/// Default depth of the queue between the byte and polling contexts
pub const DEFAULT_LINE_QUEUE_DEPTH: usize = 32;

/// Default number of node slots
pub const DEFAULT_NODE_CAPACITY: usize = 3;

/// Default time a command may wait for its acknowledgement
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Default serial baudrate of the Wio-E5
pub const DEFAULT_BAUDRATE: u32 = 9600;

/// Default follow-up bytes appended to a node status command
pub const DEFAULT_STATUS_FOLLOW_UP: [u8; 2] = [0x01, 0x00];

/// Liveness probe
pub const AT_PROBE: &str = "AT";
pub const ACK_PROBE: &str = "+AT: OK";

/// Switch the module into LoRa test mode
pub const AT_MODE_TEST: &str = "AT+MODE=TEST";
pub const ACK_MODE_TEST: &str = "+MODE: TEST";

/// Radio configuration prefix; parameters are appended by [`crate::config::RadioConfig`]
pub const AT_TEST_RFCFG: &str = "AT+TEST=RFCFG";
pub const ACK_TEST_RFCFG: &str = "+TEST: RFCFG";

/// Enter continuous receive
pub const AT_TEST_RXLRPKT: &str = "AT+TEST=RXLRPKT";
pub const ACK_TEST_RXLRPKT: &str = "+TEST: RXLRPKT";

/// Transmit a hex payload
pub const AT_TEST_TXLRPKT: &str = "AT+TEST=TXLRPKT";
pub const ACK_TEST_TXLRPKT: &str = "+TEST: TXLRPKT";

/// Prefix of a received packet line
pub const RX_LINE_PREFIX: &str = "+TEST: RX ";
