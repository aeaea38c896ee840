//! # Command Sequencer
//!
//! Issues one AT command at a time and correlates the module's reply with it.
//!
//! A command is sent together with an [`Acceptance`] predicate and a timeout. Every
//! framed line is offered to [`CommandSequencer::on_line`]; the first line the predicate
//! accepts completes the command, and every other line is handed back unclaimed so the
//! packet parser can look at it. [`CommandSequencer::tick`] reports a timeout once the
//! deadline has passed.
//!
//! Only one command may be outstanding. Sending while busy fails with
//! [`SequencerError::Busy`]; callers that want to replace a command cancel it first.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use thiserror::Error;

use crate::constants::DEFAULT_COMMAND_TIMEOUT;
use crate::link::framer::Line;
use crate::link::transport::Transport;

/// Errors raised when issuing a command
#[derive(Error, Debug)]
pub enum SequencerError {
    #[error("command {pending} is still awaiting its response")]
    Busy { pending: CommandHandle },

    #[error("failed to write command: {0}")]
    Transport(String),
}

/// Identifies one issued command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandHandle(u32);

impl CommandHandle {
    pub fn id(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for CommandHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Predicate deciding whether a line answers the pending command
#[derive(Clone)]
pub enum Acceptance {
    /// The next line of any content
    Any,
    /// A line containing the marker anywhere
    Contains(String),
    /// A line carrying the marker starting at a fixed byte offset
    AtOffset { marker: String, offset: usize },
    Custom(Arc<dyn Fn(&Line) -> bool + Send + Sync>),
}

impl Acceptance {
    pub fn any() -> Self {
        Acceptance::Any
    }

    pub fn contains(marker: impl Into<String>) -> Self {
        Acceptance::Contains(marker.into())
    }

    pub fn at_offset(marker: impl Into<String>, offset: usize) -> Self {
        Acceptance::AtOffset {
            marker: marker.into(),
            offset,
        }
    }

    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&Line) -> bool + Send + Sync + 'static,
    {
        Acceptance::Custom(Arc::new(predicate))
    }

    pub fn accepts(&self, line: &Line) -> bool {
        match self {
            Acceptance::Any => true,
            Acceptance::Contains(marker) => line.contains(marker),
            Acceptance::AtOffset { marker, offset } => line.has_at(marker, *offset),
            Acceptance::Custom(predicate) => predicate(line),
        }
    }
}

impl fmt::Debug for Acceptance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Acceptance::Any => f.write_str("Any"),
            Acceptance::Contains(marker) => f.debug_tuple("Contains").field(marker).finish(),
            Acceptance::AtOffset { marker, offset } => f
                .debug_struct("AtOffset")
                .field("marker", marker)
                .field("offset", offset)
                .finish(),
            Acceptance::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A command waiting to be sent
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub text: String,
    pub timeout: Duration,
    pub acceptance: Acceptance,
}

impl CommandRequest {
    /// Request with the default ten-second timeout
    pub fn new(text: impl Into<String>, acceptance: Acceptance) -> Self {
        CommandRequest {
            text: text.into(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
            acceptance,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// The single in-flight command
#[derive(Debug, Clone)]
pub struct PendingCommand {
    handle: CommandHandle,
    text: String,
    issued_at: Instant,
    timeout: Duration,
    acceptance: Acceptance,
}

impl PendingCommand {
    pub fn handle(&self) -> CommandHandle {
        self.handle
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Last instant at which the command is still considered pending, `None` when the
    /// timeout reaches past what `Instant` can represent
    pub fn deadline(&self) -> Option<Instant> {
        self.issued_at.checked_add(self.timeout)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.issued_at) > self.timeout
    }
}

/// How a command ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Success { handle: CommandHandle, line: Line },
    TimedOut { handle: CommandHandle, command: String },
}

impl CommandOutcome {
    pub fn handle(&self) -> CommandHandle {
        match self {
            CommandOutcome::Success { handle, .. } | CommandOutcome::TimedOut { handle, .. } => {
                *handle
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Success { .. })
    }
}

/// Where a line ended up after being offered to the sequencer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRoute {
    /// The line answered the pending command
    Response(CommandOutcome),
    /// Nobody was waiting for this line
    Unclaimed(Line),
}

/// One-at-a-time command/response correlator
#[derive(Debug, Default)]
pub struct CommandSequencer {
    pending: Option<PendingCommand>,
    next_handle: u32,
}

impl CommandSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `request` to the transport and start waiting for its response.
    ///
    /// The command bytes are written exactly once. When the write fails no command is
    /// left pending.
    pub async fn send<T>(
        &mut self,
        transport: &mut T,
        request: CommandRequest,
        now: Instant,
    ) -> Result<CommandHandle, SequencerError>
    where
        T: Transport + ?Sized,
    {
        if let Some(pending) = &self.pending {
            return Err(SequencerError::Busy {
                pending: pending.handle,
            });
        }

        transport
            .write_line(&request.text)
            .await
            .map_err(|e| SequencerError::Transport(e.to_string()))?;

        let handle = CommandHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        debug!(
            "Command {handle} sent: {} (timeout {:?})",
            request.text, request.timeout
        );

        self.pending = Some(PendingCommand {
            handle,
            text: request.text,
            issued_at: now,
            timeout: request.timeout,
            acceptance: request.acceptance,
        });
        Ok(handle)
    }

    /// Offer a framed line to the pending command.
    pub fn on_line(&mut self, line: Line) -> LineRoute {
        let accepted = self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.acceptance.accepts(&line));

        match self.pending.take() {
            Some(pending) if accepted => {
                debug!("Command {} answered: {line}", pending.handle);
                LineRoute::Response(CommandOutcome::Success {
                    handle: pending.handle,
                    line,
                })
            }
            other => {
                self.pending = other;
                LineRoute::Unclaimed(line)
            }
        }
    }

    /// Report a timeout once the pending command's deadline has passed.
    pub fn tick(&mut self, now: Instant) -> Option<CommandOutcome> {
        if !self.pending.as_ref()?.is_expired(now) {
            return None;
        }
        let pending = self.pending.take()?;
        warn!(
            "Command {} timed out after {:?}: {}",
            pending.handle, pending.timeout, pending.text
        );
        Some(CommandOutcome::TimedOut {
            handle: pending.handle,
            command: pending.text,
        })
    }

    /// Abandon the pending command, if any
    pub fn cancel(&mut self) -> Option<CommandHandle> {
        let pending = self.pending.take()?;
        debug!("Command {} cancelled", pending.handle);
        Some(pending.handle)
    }

    pub fn pending(&self) -> Option<&PendingCommand> {
        self.pending.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }
}
