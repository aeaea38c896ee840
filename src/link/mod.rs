//! Serial link to the radio module: line framing, the byte-to-poller queue, the
//! command sequencer and the write side of the port.

pub mod framer;
pub mod mock;
pub mod queue;
pub mod sequencer;
pub mod transport;

pub use framer::{FrameError, FramerState, FramerStats, Line, LineFramer};
pub use mock::MockTransport;
pub use queue::{line_queue, ByteSink, LineReceiver, ReceivedLine, SinkStats};
pub use sequencer::{
    Acceptance, CommandHandle, CommandOutcome, CommandRequest, CommandSequencer, LineRoute,
    PendingCommand, SequencerError,
};
pub use transport::{open_serial, spawn_byte_reader, SerialConfig, StreamTransport, Transport};
