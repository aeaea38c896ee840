//! # Utility Modules
//!
//! Hex helpers and logging patterns shared across the gateway crate.

pub mod hex;
pub mod logging;

pub use hex::{encode_hex_upper, format_hex_compact, is_hex_digits};
pub use logging::{log_line_bytes, LogThrottle};
