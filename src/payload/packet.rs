//! # Hex Packet Parser
//!
//! Decodes the payload of a received-packet line into a [`NodeRecord`]. The module
//! prints received packets as
//!
//! ```text
//! +TEST: RX "591011BA141F172F"
//! ```
//!
//! The text between the first and last double quote holds at least 16 hex digits: the
//! response id, the node id and six parameter bytes, each as one hex pair. Anything
//! after the 16th digit is ignored so newer nodes may append fields.

use nom::bytes::complete::take;
use nom::combinator::map_res;
use nom::multi::count;
use nom::IResult;
use thiserror::Error;

use crate::constants::{PACKET_BYTES, PAYLOAD_HEX_LEN, PAYLOAD_QUOTE};
use crate::payload::record::NodeRecord;
use crate::util::hex::is_hex_digits;

/// Reasons a data line cannot be decoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("payload is not enclosed in double quotes")]
    MissingDelimiters,

    #[error("payload has {len} characters, need at least {}", PAYLOAD_HEX_LEN)]
    PayloadTooShort { len: usize },

    #[error("invalid hex digit pair at payload offset {offset}")]
    InvalidHexDigit { offset: usize },
}

/// Decode a received-packet line.
pub fn parse_packet(line: &str) -> Result<NodeRecord, PacketError> {
    let payload = quoted_payload(line)?.as_bytes();
    if payload.len() < PAYLOAD_HEX_LEN {
        return Err(PacketError::PayloadTooShort { len: payload.len() });
    }

    let digits = &payload[..PAYLOAD_HEX_LEN];
    let (_, decoded) = count(hex_pair, PACKET_BYTES)(digits).map_err(|e| match e {
        nom::Err::Error(e) | nom::Err::Failure(e) => PacketError::InvalidHexDigit {
            offset: digits.len() - e.input.len(),
        },
        nom::Err::Incomplete(_) => PacketError::PayloadTooShort { len: payload.len() },
    })?;

    let mut bytes = [0u8; PACKET_BYTES];
    bytes.copy_from_slice(&decoded);
    Ok(NodeRecord::from_bytes(bytes))
}

/// Text between the first and last quote of `line`
fn quoted_payload(line: &str) -> Result<&str, PacketError> {
    match (line.find(PAYLOAD_QUOTE), line.rfind(PAYLOAD_QUOTE)) {
        (Some(first), Some(last)) if first < last => Ok(&line[first + 1..last]),
        _ => Err(PacketError::MissingDelimiters),
    }
}

/// One byte encoded as two hex digits
fn hex_pair(input: &[u8]) -> IResult<&[u8], u8> {
    map_res(take(2usize), |pair: &[u8]| {
        if !is_hex_digits(pair) {
            return Err(());
        }
        std::str::from_utf8(pair)
            .ok()
            .and_then(|digits| u8::from_str_radix(digits, 16).ok())
            .ok_or(())
    })(input)
}
