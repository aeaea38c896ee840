//! # Gateway
//!
//! One [`Gateway`] per radio module. It owns the polling side of the link: the line
//! queue, the command sequencer, the transport and the node registry. The matching
//! [`ByteSink`] returned by [`Gateway::new`] goes to whatever delivers received bytes.
//!
//! Every line drained from the queue is first offered to the sequencer. Lines that do
//! not answer the pending command and look like received packets are decoded and
//! stored in the registry. Everything that happens is reported as a [`GatewayEvent`],
//! including rejected packets and registry overflows.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use tokio::task::JoinHandle;
use tokio::time::timeout_at;

use crate::commands::AtCommand;
use crate::config::GatewayConfig;
use crate::constants::RX_LINE_PREFIX;
use crate::error::GatewayError;
use crate::link::framer::Line;
use crate::link::queue::{line_queue, ByteSink, LineReceiver, ReceivedLine};
use crate::link::sequencer::{
    CommandHandle, CommandOutcome, CommandRequest, CommandSequencer, LineRoute, PendingCommand,
};
use crate::link::transport::{open_serial, spawn_byte_reader, SerialTransport, Transport};
use crate::payload::packet::{parse_packet, PacketError};
use crate::payload::record::NodeRecord;
use crate::registry::{NodeRegistry, RegistryError, RegistrySnapshot, SharedRegistry, SlotIndex};
use crate::log_warn_throttled;
use crate::util::logging::{log_line_bytes, LogThrottle};

/// Something the gateway observed while routing lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// The pending command was answered or timed out
    CommandCompleted(CommandOutcome),
    /// A node record was stored
    NodeUpdated { slot: SlotIndex, record: NodeRecord },
    /// A received-packet line could not be decoded
    PacketRejected { line: Line, error: PacketError },
    /// A decoded record did not fit in the registry
    RegistryRejected { record: NodeRecord, error: RegistryError },
    /// A line nobody was waiting for
    Unsolicited(Line),
}

/// Statistics for the polling side
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GatewayStats {
    pub lines_routed: u64,
    pub responses: u64,
    pub timeouts: u64,
    pub packets_decoded: u64,
    pub packets_rejected: u64,
    pub registry_rejections: u64,
    pub unsolicited: u64,
    /// Events discarded because nobody polled while `execute` kept running
    pub deferred_dropped: u64,
}

pub struct Gateway<T> {
    config: GatewayConfig,
    transport: T,
    lines: LineReceiver,
    sequencer: CommandSequencer,
    registry: SharedRegistry,
    /// Events observed while `execute` waited for its response, at most
    /// `line_queue_depth` of them; the oldest is dropped first
    deferred: VecDeque<GatewayEvent>,
    defer_throttle: LogThrottle,
    stats: GatewayStats,
}

/// Tolerance past a command deadline before waking up to report the timeout
const DEADLINE_SLACK: Duration = Duration::from_millis(1);

fn wake_at(deadline: Option<Instant>) -> Option<tokio::time::Instant> {
    deadline?
        .checked_add(DEADLINE_SLACK)
        .map(tokio::time::Instant::from_std)
}

enum Wait {
    Line(ReceivedLine),
    Closed,
    DeadlinePassed,
}

/// Wait for the next queued line, giving up shortly after `deadline` if there is one.
async fn wait_for_line(lines: &mut LineReceiver, deadline: Option<Instant>) -> Wait {
    let received = match wake_at(deadline) {
        Some(at) => match timeout_at(at, lines.recv()).await {
            Ok(received) => received,
            Err(_) => return Wait::DeadlinePassed,
        },
        None => lines.recv().await,
    };
    received.map_or(Wait::Closed, Wait::Line)
}

impl<T: Transport> Gateway<T> {
    /// Create a gateway writing through `transport`.
    ///
    /// Returns the gateway and the sink that received bytes must be fed into.
    pub fn new(config: GatewayConfig, transport: T) -> Result<(Self, ByteSink), GatewayError> {
        config.validate()?;
        let (sink, lines) = line_queue(config.max_line_len, config.line_queue_depth);
        let registry = Arc::new(Mutex::new(NodeRegistry::with_capacity(config.node_capacity)));

        let gateway = Gateway {
            config,
            transport,
            lines,
            sequencer: CommandSequencer::new(),
            registry,
            deferred: VecDeque::new(),
            defer_throttle: LogThrottle::new(1000, 5),
            stats: GatewayStats::default(),
        };
        Ok((gateway, sink))
    }

    /// Issue a command without waiting for its response.
    pub async fn send(
        &mut self,
        request: CommandRequest,
        now: Instant,
    ) -> Result<CommandHandle, GatewayError> {
        Ok(self.sequencer.send(&mut self.transport, request, now).await?)
    }

    /// Transmit the status frame for `node_id`; the acknowledgement arrives as a
    /// [`GatewayEvent::CommandCompleted`].
    pub async fn send_node_status(
        &mut self,
        node_id: u8,
        now: Instant,
    ) -> Result<CommandHandle, GatewayError> {
        let command = AtCommand::NodeStatus {
            node_id,
            follow_up: self.config.status_follow_up,
        };
        self.send(command.request(self.config.command_timeout), now)
            .await
    }

    pub fn cancel(&mut self) -> Option<CommandHandle> {
        self.sequencer.cancel()
    }

    /// Route one line: command response first, then packet decoding.
    pub fn route_line(&mut self, line: Line) -> GatewayEvent {
        self.stats.lines_routed += 1;

        let line = match self.sequencer.on_line(line) {
            LineRoute::Response(outcome) => {
                self.stats.responses += 1;
                return GatewayEvent::CommandCompleted(outcome);
            }
            LineRoute::Unclaimed(line) => line,
        };

        if !line.as_str().starts_with(RX_LINE_PREFIX) {
            self.stats.unsolicited += 1;
            trace!("Unsolicited line: {line}");
            return GatewayEvent::Unsolicited(line);
        }

        match parse_packet(line.as_str()) {
            Ok(record) => self.store(record),
            Err(error) => {
                self.stats.packets_rejected += 1;
                warn!("Discarding packet line ({error}): {line}");
                log_line_bytes("Rejected packet", line.as_str().as_bytes());
                GatewayEvent::PacketRejected { line, error }
            }
        }
    }

    fn store(&mut self, record: NodeRecord) -> GatewayEvent {
        self.stats.packets_decoded += 1;
        let result = self.lock_registry().upsert(record);

        match result {
            Ok(slot) => {
                debug!(
                    "Node 0x{:02X} stored in slot {slot} (response 0x{:02X}, params {})",
                    record.node_id,
                    record.response_id,
                    crate::util::hex::encode_hex_upper(&record.params)
                );
                GatewayEvent::NodeUpdated { slot, record }
            }
            Err(error) => {
                self.stats.registry_rejections += 1;
                warn!("Node 0x{:02X} not stored: {error}", record.node_id);
                GatewayEvent::RegistryRejected { record, error }
            }
        }
    }

    /// Report a timeout of the pending command, if its deadline has passed.
    pub fn tick(&mut self, now: Instant) -> Option<GatewayEvent> {
        let outcome = self.sequencer.tick(now)?;
        self.stats.timeouts += 1;
        Some(GatewayEvent::CommandCompleted(outcome))
    }

    /// Route a drained line, first expiring the pending command if its deadline had
    /// already passed when the line arrived.
    fn route_received(&mut self, received: ReceivedLine) -> (Option<GatewayEvent>, GatewayEvent) {
        let expired = self.tick(received.received_at);
        (expired, self.route_line(received.line))
    }

    fn defer(&mut self, event: GatewayEvent) {
        if self.deferred.len() >= self.config.line_queue_depth {
            self.deferred.pop_front();
            self.stats.deferred_dropped += 1;
            log_warn_throttled!(
                self.defer_throttle,
                "{} events waiting for poll, dropping the oldest",
                self.config.line_queue_depth
            );
        }
        self.deferred.push_back(event);
    }

    /// Route every queued line, then check the pending command's deadline.
    ///
    /// Each line is judged against the deadline as of its arrival, so a response that
    /// came in late is reported as a timeout followed by the line itself.
    ///
    /// Fails with [`GatewayError::QueueClosed`] only when nothing is left to report
    /// and the byte side has gone away.
    pub fn poll(&mut self, now: Instant) -> Result<Vec<GatewayEvent>, GatewayError> {
        let mut events: Vec<GatewayEvent> = self.deferred.drain(..).collect();

        loop {
            match self.lines.try_next() {
                Ok(Some(received)) => {
                    let (expired, event) = self.route_received(received);
                    events.extend(expired);
                    events.push(event);
                }
                Ok(None) => break,
                Err(error) if events.is_empty() && !self.sequencer.is_busy() => {
                    return Err(error)
                }
                Err(_) => break,
            }
        }

        events.extend(self.tick(now));
        Ok(events)
    }

    /// Wait until at least one event is available.
    pub async fn next_events(&mut self) -> Result<Vec<GatewayEvent>, GatewayError> {
        loop {
            let events = self.poll(Instant::now())?;
            if !events.is_empty() {
                return Ok(events);
            }

            let deadline = self.sequencer.pending().and_then(PendingCommand::deadline);
            match wait_for_line(&mut self.lines, deadline).await {
                Wait::Line(received) => {
                    let (expired, event) = self.route_received(received);
                    if let Some(expired) = expired {
                        self.defer(expired);
                    }
                    self.defer(event);
                }
                Wait::Closed => return Err(GatewayError::QueueClosed),
                Wait::DeadlinePassed => {}
            }
        }
    }

    /// Send a command and wait for its response line.
    ///
    /// Packets received while waiting are still decoded and stored; their events are
    /// returned by the next [`Gateway::poll`]. Callers that only ever execute commands
    /// keep the most recent `line_queue_depth` of those events.
    pub async fn execute(&mut self, request: CommandRequest) -> Result<Line, GatewayError> {
        self.send(request, Instant::now()).await?;

        while self.sequencer.is_busy() {
            let deadline = self.sequencer.pending().and_then(PendingCommand::deadline);
            match wait_for_line(&mut self.lines, deadline).await {
                Wait::Line(received) => {
                    let (expired, event) = self.route_received(received);
                    if let Some(GatewayEvent::CommandCompleted(CommandOutcome::TimedOut {
                        command,
                        ..
                    })) = expired
                    {
                        self.defer(event);
                        return Err(GatewayError::CommandTimeout { command });
                    }
                    match event {
                        GatewayEvent::CommandCompleted(CommandOutcome::Success { line, .. }) => {
                            return Ok(line)
                        }
                        event => self.defer(event),
                    }
                }
                Wait::Closed => {
                    self.sequencer.cancel();
                    return Err(GatewayError::QueueClosed);
                }
                Wait::DeadlinePassed => {}
            }

            if let Some(GatewayEvent::CommandCompleted(CommandOutcome::TimedOut { command, .. })) =
                self.tick(Instant::now())
            {
                return Err(GatewayError::CommandTimeout { command });
            }
        }

        Err(GatewayError::QueueClosed)
    }

    /// [`Gateway::execute`], resending after each timeout up to `attempts` times.
    pub async fn execute_with_retry(
        &mut self,
        request: CommandRequest,
        attempts: u32,
    ) -> Result<Line, GatewayError> {
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.execute(request.clone()).await {
                Err(GatewayError::CommandTimeout { command }) if attempt < attempts => {
                    warn!("No response to {command}, retrying ({attempt}/{attempts})");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Bring the module into LoRa test mode and start continuous receive.
    pub async fn configure_radio(&mut self) -> Result<(), GatewayError> {
        for command in AtCommand::setup_sequence(&self.config.radio) {
            let request = command.request(self.config.command_timeout);
            let response = self
                .execute_with_retry(request, self.config.setup_attempts)
                .await?;
            info!("{} -> {response}", command.to_command_string());
        }
        info!(
            "Radio listening on {} MHz SF{}",
            self.config.radio.frequency_mhz, self.config.radio.spreading_factor
        );
        Ok(())
    }

    fn lock_registry(&self) -> MutexGuard<'_, NodeRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle for telemetry readers on other threads
    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    pub fn lookup(&self, node_id: u8) -> Option<NodeRecord> {
        self.lock_registry().lookup(node_id)
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.lock_registry().snapshot()
    }

    pub fn is_busy(&self) -> bool {
        self.sequencer.is_busy()
    }

    pub fn sequencer(&self) -> &CommandSequencer {
        &self.sequencer
    }

    pub fn stats(&self) -> GatewayStats {
        self.stats
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl Gateway<SerialTransport> {
    /// Open the module's serial port and start delivering its bytes.
    ///
    /// Must be called from within a tokio runtime; the returned task ends when the
    /// port closes.
    pub fn open_serial(
        port_name: &str,
        config: GatewayConfig,
    ) -> Result<(Self, JoinHandle<io::Result<u64>>), GatewayError> {
        let (transport, reader) = open_serial(port_name, &config.serial)?;
        let (gateway, sink) = Gateway::new(config, transport)?;
        let reader_task = spawn_byte_reader(reader, sink);
        Ok((gateway, reader_task))
    }
}
