//! # Hex Encoding Utilities
//!
//! Hex helpers shared by the packet codec and the logging helpers.
//!
//! ```rust
//! use e5_gateway::util::hex::{encode_hex_upper, format_hex_compact};
//!
//! assert_eq!(encode_hex_upper(&[0x59, 0x10]), "5910");
//! assert_eq!(format_hex_compact(&[0x2b, 0x0a]), "2b 0a");
//! ```

/// Encode bytes to uppercase hex string, the form the radio module prints
pub fn encode_hex_upper(data: &[u8]) -> String {
    hex::encode_upper(data)
}

/// Format hex data for compact display (useful for logs)
///
/// Formats data as "2b 54 45" with spaces between bytes.
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// True when every byte is an ASCII hex digit
pub fn is_hex_digits(data: &[u8]) -> bool {
    data.iter().all(u8::is_ascii_hexdigit)
}
