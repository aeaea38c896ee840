//! Decoding of node payloads received over the air.

pub mod packet;
pub mod record;

pub use packet::{parse_packet, PacketError};
pub use record::NodeRecord;
