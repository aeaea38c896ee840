//! Byte-delivery side of the gateway
//!
//! The serial read callback (or interrupt-like context) owns a [`ByteSink`]. Each byte
//! is framed inside a short critical section, and completed lines are handed to the
//! polling context through a bounded channel. Pushing never blocks: when the queue is
//! full the line is dropped and counted.
//!
//! Every queued line carries the instant its end marker arrived, so the polling context
//! can judge command deadlines by arrival rather than by when it got around to draining.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use log::{debug, trace};
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::mpsc::{channel, Receiver, Sender};

use crate::error::GatewayError;
use crate::link::framer::{FrameError, Line, LineFramer};
use crate::log_warn_throttled;
use crate::util::logging::LogThrottle;

const WARN_WINDOW_MS: u64 = 1000;
const WARN_CAP: u32 = 5;

/// Statistics for the byte-delivery side
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SinkStats {
    pub bytes_fed: u64,
    pub lines_queued: u64,
    /// Lines lost because the queue was full or closed
    pub lines_dropped: u64,
    pub malformed_frames: u64,
    pub resyncs: u64,
}

/// A completed line and the instant its end marker was delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedLine {
    pub line: Line,
    pub received_at: Instant,
}

#[derive(Debug)]
struct SinkState {
    framer: LineFramer,
    stats: SinkStats,
    malformed_throttle: LogThrottle,
    queue_throttle: LogThrottle,
}

/// Producer handle fed one byte at a time
#[derive(Debug, Clone)]
pub struct ByteSink {
    state: Arc<Mutex<SinkState>>,
    tx: Sender<ReceivedLine>,
}

/// Consumer handle drained by the polling context
#[derive(Debug)]
pub struct LineReceiver {
    rx: Receiver<ReceivedLine>,
    capacity: usize,
}

/// Create a connected sink/receiver pair.
///
/// # Arguments
/// * `max_line_len` - Longest line the framer accepts, start marker included
/// * `depth` - Number of completed lines the queue can hold (at least one)
pub fn line_queue(max_line_len: usize, depth: usize) -> (ByteSink, LineReceiver) {
    let capacity = depth.max(1);
    let (tx, rx) = channel(capacity);
    let sink = ByteSink {
        state: Arc::new(Mutex::new(SinkState {
            framer: LineFramer::new(max_line_len),
            stats: SinkStats::default(),
            malformed_throttle: LogThrottle::new(WARN_WINDOW_MS, WARN_CAP),
            queue_throttle: LogThrottle::new(WARN_WINDOW_MS, WARN_CAP),
        })),
        tx,
    };
    (sink, LineReceiver { rx, capacity })
}

impl ByteSink {
    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver one received byte
    pub fn feed(&self, byte: u8) {
        let mut state = self.lock();
        state.stats.bytes_fed += 1;
        let resyncs_before = state.framer.stats().resyncs;

        let result = state.framer.feed(byte);
        let resyncs_after = state.framer.stats().resyncs;
        state.stats.resyncs += resyncs_after - resyncs_before;

        match result {
            Ok(Some(line)) => self.enqueue(&mut state, line),
            Ok(None) => {}
            Err(FrameError::MalformedFrame { limit }) => {
                state.stats.malformed_frames += 1;
                log_warn_throttled!(
                    state.malformed_throttle,
                    "Malformed frame: line exceeded {limit} bytes, discarded"
                );
            }
        }
    }

    /// Deliver a run of received bytes
    pub fn feed_slice(&self, data: &[u8]) {
        for &byte in data {
            self.feed(byte);
        }
    }

    fn enqueue(&self, state: &mut SinkState, line: Line) {
        let received = ReceivedLine {
            line,
            received_at: Instant::now(),
        };
        match self.tx.try_send(received) {
            Ok(()) => {
                state.stats.lines_queued += 1;
                trace!("Line queued");
            }
            Err(TrySendError::Full(received)) => {
                state.stats.lines_dropped += 1;
                log_warn_throttled!(
                    state.queue_throttle,
                    "Line queue full, dropping: {}",
                    received.line
                );
            }
            Err(TrySendError::Closed(received)) => {
                state.stats.lines_dropped += 1;
                debug!("Line queue closed, dropping: {}", received.line);
            }
        }
    }

    pub fn stats(&self) -> SinkStats {
        self.lock().stats
    }

    /// True while a line is partially accumulated
    pub fn is_framing(&self) -> bool {
        self.lock().framer.is_framing()
    }

    /// Discard any partial line, e.g. after reopening the port
    pub fn reset(&self) {
        self.lock().framer.reset();
    }
}

impl LineReceiver {
    /// Take the next queued line without waiting.
    ///
    /// Returns `Ok(None)` when the queue is empty and
    /// [`GatewayError::QueueClosed`] once every sink is gone and the queue is drained.
    pub fn try_next(&mut self) -> Result<Option<ReceivedLine>, GatewayError> {
        match self.rx.try_recv() {
            Ok(received) => Ok(Some(received)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(GatewayError::QueueClosed),
        }
    }

    /// Wait for the next line; `None` once every sink is gone
    pub async fn recv(&mut self) -> Option<ReceivedLine> {
        self.rx.recv().await
    }

    /// Take the text of every line currently queued
    pub fn drain(&mut self) -> Vec<Line> {
        let mut lines = Vec::new();
        while let Ok(received) = self.rx.try_recv() {
            lines.push(received.line);
        }
        lines
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
