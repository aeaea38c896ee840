//! # Line Framer
//!
//! Assembles the raw byte stream coming out of the radio module into discrete lines.
//! A line opens with the start marker (`+`, kept as the first character) and closes with
//! the end marker (`\n`, dropped together with a preceding `\r`).
//!
//! The framer is a two-state machine:
//!
//! - `Idle`: bytes are discarded until a start marker arrives.
//! - `Framing`: bytes accumulate until the end marker, or until the buffer would exceed
//!   the configured maximum, in which case the partial line is dropped and a
//!   [`FrameError::MalformedFrame`] is reported.
//!
//! A start marker seen while already framing restarts the line. The partial content is
//! discarded and counted as a resync rather than treated as an error.

use std::fmt;

use bytes::BytesMut;
use log::{debug, trace};
use thiserror::Error;

use crate::constants::{CARRIAGE_RETURN, DEFAULT_MAX_LINE_LEN, END_MARKER, START_MARKER};

/// Errors reported while framing lines
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("line exceeded {limit} bytes before the end marker")]
    MalformedFrame { limit: usize },
}

/// A completed line of protocol text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Line(String);

impl Line {
    pub fn new(text: impl Into<String>) -> Self {
        Line(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, marker: &str) -> bool {
        self.0.contains(marker)
    }

    /// True when `marker` appears starting exactly at byte `offset`.
    pub fn has_at(&self, marker: &str, offset: usize) -> bool {
        self.0
            .get(offset..)
            .is_some_and(|rest| rest.starts_with(marker))
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Line {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Framer state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    Idle,
    Framing,
}

/// Counters kept by a [`LineFramer`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FramerStats {
    /// Lines emitted
    pub lines: u64,
    /// Lines dropped for exceeding the maximum length, raw or decoded
    pub malformed: u64,
    /// Partial lines discarded by a new start marker
    pub resyncs: u64,
    /// Bytes discarded while idle
    pub idle_bytes: u64,
}

/// Byte-at-a-time line accumulator
#[derive(Debug)]
pub struct LineFramer {
    buffer: BytesMut,
    state: FramerState,
    max_len: usize,
    stats: FramerStats,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LEN)
    }
}

impl LineFramer {
    /// Create a framer emitting lines of at most `max_len` bytes, start marker included.
    ///
    /// The limit applies to the emitted text: a trailing `\r` before the end marker is
    /// not counted, and invalid UTF-8 is counted after lossy decoding. A limit below one
    /// byte cannot hold the start marker and is raised to one.
    pub fn new(max_len: usize) -> Self {
        let max_len = max_len.max(1);
        LineFramer {
            buffer: BytesMut::with_capacity(max_len + 1),
            state: FramerState::Idle,
            max_len,
            stats: FramerStats::default(),
        }
    }

    /// Consume one byte, returning a line when the end marker completes one.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Line>, FrameError> {
        if byte == START_MARKER {
            if self.state == FramerState::Framing {
                self.stats.resyncs += 1;
                debug!(
                    "Start marker mid-frame, discarding {} buffered bytes",
                    self.buffer.len()
                );
            }
            self.buffer.clear();
            self.buffer.extend_from_slice(&[START_MARKER]);
            self.state = FramerState::Framing;
            return Ok(None);
        }

        match self.state {
            FramerState::Idle => {
                self.stats.idle_bytes += 1;
                Ok(None)
            }
            FramerState::Framing if byte == END_MARKER => self.take_line().map(Some),
            FramerState::Framing => {
                // One byte of slack for the carriage return stripped at the end marker
                let cr_slack = byte == CARRIAGE_RETURN && self.buffer.len() == self.max_len;
                if self.buffer.len() >= self.max_len && !cr_slack {
                    return Err(self.malformed());
                }
                self.buffer.extend_from_slice(&[byte]);
                Ok(None)
            }
        }
    }

    fn malformed(&mut self) -> FrameError {
        self.buffer.clear();
        self.state = FramerState::Idle;
        self.stats.malformed += 1;
        FrameError::MalformedFrame {
            limit: self.max_len,
        }
    }

    /// Feed a run of bytes and collect every completed line.
    ///
    /// Malformed frames are skipped; they remain visible through [`LineFramer::stats`].
    pub fn feed_slice(&mut self, data: &[u8]) -> Vec<Line> {
        data.iter()
            .filter_map(|&byte| self.feed(byte).ok().flatten())
            .collect()
    }

    fn take_line(&mut self) -> Result<Line, FrameError> {
        if self.buffer.last() == Some(&CARRIAGE_RETURN) {
            self.buffer.truncate(self.buffer.len() - 1);
        }

        // Each invalid byte decodes to a three-byte replacement character
        let text = String::from_utf8_lossy(&self.buffer).into_owned();
        if text.len() > self.max_len {
            debug!(
                "Line of {} raw bytes decodes to {} bytes, over the {} byte limit",
                self.buffer.len(),
                text.len(),
                self.max_len
            );
            return Err(self.malformed());
        }

        self.buffer.clear();
        self.state = FramerState::Idle;
        self.stats.lines += 1;

        let line = Line(text);
        trace!("Framed line ({} bytes): {}", line.len(), line);
        Ok(line)
    }

    /// Drop any partial line and return to idle
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = FramerState::Idle;
    }

    pub fn state(&self) -> FramerState {
        self.state
    }

    pub fn is_framing(&self) -> bool {
        self.state == FramerState::Framing
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Bytes currently buffered for the in-progress line
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> FramerStats {
        self.stats
    }
}
