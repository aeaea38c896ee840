//! End-to-end tests of the gateway against a simulated Wio-E5 module.
//!
//! The simulated module watches the commands written to a [`MockTransport`] and feeds
//! its replies back through the gateway's byte sink, the way the serial reader task
//! would.

use std::time::{Duration, Instant};

use e5_gateway::link::mock::MockTransport;
use e5_gateway::link::queue::ByteSink;
use e5_gateway::{
    AtCommand, CommandOutcome, Gateway, GatewayConfig, GatewayError, GatewayEvent, Line,
    NodeRecord, RegistryError,
};
use tokio::task::JoinHandle;

fn spawn_module<F>(sink: ByteSink, mock: MockTransport, reply: F) -> JoinHandle<()>
where
    F: Fn(usize, &str) -> Option<String> + Send + 'static,
{
    tokio::spawn(async move {
        let mut answered = 0;
        loop {
            let written = mock.written();
            for (index, command) in written.iter().enumerate().skip(answered) {
                if let Some(bytes) = reply(index, command.as_str()) {
                    sink.feed_slice(bytes.as_bytes());
                }
            }
            answered = written.len();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
}

/// Replies of a module that answers every command it knows.
fn wio_e5(_index: usize, command: &str) -> Option<String> {
    let reply = match command {
        "AT" => "+AT: OK",
        "AT+MODE=TEST" => "+MODE: TEST",
        "AT+TEST=RXLRPKT" => "+TEST: RXLRPKT",
        c if c.starts_with("AT+TEST=RFCFG") => {
            "+TEST: RFCFG F:868000000, SF12, BW125K, TXPR:12, RXPR:15, POW:14dBm, CRC:ON, IQ:OFF, NET:OFF"
        }
        c if c.starts_with("AT+TEST=TXLRPKT") => "+TEST: TXLRPKT \"100100\"",
        _ => return None,
    };
    Some(format!("{reply}\r\n"))
}

fn short_timeout_config() -> GatewayConfig {
    GatewayConfig {
        command_timeout: Duration::from_millis(20),
        ..GatewayConfig::default()
    }
}

fn gateway_with(config: GatewayConfig) -> (Gateway<MockTransport>, ByteSink, MockTransport) {
    let mock = MockTransport::new();
    let (gateway, sink) = Gateway::new(config, mock.clone()).unwrap();
    (gateway, sink, mock)
}

/// Tests that data lines fill the registry and overflow is reported.
#[tokio::test]
async fn test_packets_fill_registry() {
    let (mut gateway, sink, _) = gateway_with(GatewayConfig::default());
    for node in [0x10u8, 0x11, 0x12, 0x13] {
        let record = NodeRecord::new(0x59, node, [node; 6]);
        sink.feed_slice(format!("{}\r\n", record.to_rx_line()).as_bytes());
    }

    let events = gateway.poll(Instant::now()).unwrap();
    assert_eq!(events.len(), 4);
    for (slot, event) in events.iter().take(3).enumerate() {
        assert!(matches!(event, GatewayEvent::NodeUpdated { slot: s, .. } if *s == slot));
    }
    assert!(matches!(
        &events[3],
        GatewayEvent::RegistryRejected {
            error: RegistryError::Full { capacity: 3, node_id: 0x13 },
            ..
        }
    ));

    assert_eq!(gateway.lookup(0x12).map(|r| r.params), Some([0x12; 6]));
    assert_eq!(gateway.stats().packets_decoded, 4);
    assert_eq!(gateway.stats().registry_rejections, 1);
}

/// Tests that a malformed data line leaves the registry untouched.
#[tokio::test]
async fn test_malformed_packet_is_rejected() {
    let (mut gateway, sink, _) = gateway_with(GatewayConfig::default());
    sink.feed_slice(b"+TEST: RX \"5910\"\r\n+TEST: RX \"591011BA141F172F\"\r\n");

    let events = gateway.poll(Instant::now()).unwrap();
    assert!(matches!(events[0], GatewayEvent::PacketRejected { .. }));
    assert!(matches!(events[1], GatewayEvent::NodeUpdated { slot: 0, .. }));
    assert_eq!(gateway.snapshot().nodes.len(), 1);
    assert_eq!(gateway.stats().packets_rejected, 1);
}

/// Tests the full setup sequence against a responsive module.
#[tokio::test]
async fn test_configure_radio() {
    let (mut gateway, sink, mock) = gateway_with(GatewayConfig::default());
    let module = spawn_module(sink, mock.clone(), wio_e5);

    gateway.configure_radio().await.unwrap();
    module.abort();

    assert_eq!(
        mock.written(),
        vec![
            "AT",
            "AT+MODE=TEST",
            "AT+TEST=RFCFG,868,SF12,125,12,15,14,ON,OFF,OFF",
            "AT+TEST=RXLRPKT",
        ]
    );
    assert!(!gateway.is_busy());
    assert_eq!(gateway.stats().responses, 4);
}

/// Tests that an unanswered command surfaces as a timeout error.
#[tokio::test]
async fn test_execute_times_out() {
    let (mut gateway, _sink, mock) = gateway_with(short_timeout_config());
    let request = AtCommand::Probe.request(Duration::from_millis(20));

    let result = gateway.execute(request).await;
    assert!(matches!(result, Err(GatewayError::CommandTimeout { ref command }) if command == "AT"));
    assert_eq!(mock.written(), vec!["AT"]);
    assert_eq!(gateway.stats().timeouts, 1);
    assert!(!gateway.is_busy());
}

/// Tests that a timed-out command is resent.
#[tokio::test]
async fn test_execute_with_retry_resends() {
    let (mut gateway, sink, mock) = gateway_with(short_timeout_config());
    let module = spawn_module(sink, mock.clone(), |index, command| {
        if index == 0 {
            None
        } else {
            wio_e5(index, command)
        }
    });

    let line = gateway
        .execute_with_retry(AtCommand::Probe.request(Duration::from_millis(20)), 3)
        .await
        .unwrap();
    module.abort();

    assert_eq!(line, Line::new("+AT: OK"));
    assert_eq!(mock.written(), vec!["AT", "AT"]);
}

/// Tests that packets arriving during a command are kept for the next poll.
#[tokio::test]
async fn test_packets_during_execute_are_deferred() {
    let (mut gateway, sink, mock) = gateway_with(GatewayConfig::default());
    let module = spawn_module(sink, mock.clone(), |index, command| {
        wio_e5(index, command).map(|ack| format!("+TEST: RX \"591011BA141F172F\"\r\n{ack}"))
    });

    let line = gateway
        .execute(AtCommand::Probe.request(Duration::from_secs(1)))
        .await
        .unwrap();
    module.abort();
    assert_eq!(line, Line::new("+AT: OK"));

    let events = gateway.poll(Instant::now()).unwrap();
    assert!(matches!(
        events.as_slice(),
        [GatewayEvent::NodeUpdated { slot: 0, record }] if record.node_id == 0x10
    ));
}

/// Tests the node status command and its acknowledgement.
#[tokio::test]
async fn test_node_status_acknowledged() {
    let (mut gateway, sink, mock) = gateway_with(GatewayConfig::default());
    let handle = gateway.send_node_status(0x10, Instant::now()).await.unwrap();
    assert_eq!(mock.last_written().as_deref(), Some("AT+TEST=TXLRPKT,\"100100\""));

    sink.feed_slice(b"+TEST: TXLRPKT \"100100\"\r\n+TEST: TX DONE\r\n");
    let events = gateway.poll(Instant::now()).unwrap();

    assert_eq!(
        events,
        vec![
            GatewayEvent::CommandCompleted(CommandOutcome::Success {
                handle,
                line: Line::new("+TEST: TXLRPKT \"100100\""),
            }),
            GatewayEvent::Unsolicited(Line::new("+TEST: TX DONE")),
        ]
    );
}

/// Tests the blocking node status helper.
#[tokio::test]
async fn test_send_node_status_helper() {
    let (mut gateway, sink, mock) = gateway_with(GatewayConfig::default());
    let module = spawn_module(sink, mock.clone(), wio_e5);

    let ack = e5_gateway::send_node_status(&mut gateway, 0x10).await.unwrap();
    module.abort();
    assert!(ack.contains("TXLRPKT"));
}

/// Tests that a second command is refused while one is pending.
#[tokio::test]
async fn test_gateway_rejects_second_command() {
    let (mut gateway, _sink, mock) = gateway_with(GatewayConfig::default());
    gateway.send_node_status(0x10, Instant::now()).await.unwrap();

    let result = gateway.send_node_status(0x11, Instant::now()).await;
    assert!(matches!(result, Err(GatewayError::Sequencer(_))));
    assert_eq!(mock.written().len(), 1);

    assert!(gateway.cancel().is_some());
    assert!(gateway.send_node_status(0x11, Instant::now()).await.is_ok());
}

/// Tests that waiting for events reports a timeout.
#[tokio::test]
async fn test_next_events_reports_timeout() {
    let (mut gateway, _sink, _) = gateway_with(short_timeout_config());
    let request = AtCommand::Probe.request(Duration::from_millis(20));
    let handle = gateway.send(request, Instant::now()).await.unwrap();

    let events = gateway.next_events().await.unwrap();
    assert_eq!(
        events,
        vec![GatewayEvent::CommandCompleted(CommandOutcome::TimedOut {
            handle,
            command: "AT".to_string(),
        })]
    );
}

/// Tests that a response arriving after the deadline is not taken as success, even
/// when the poll that drains it comes later still.
#[tokio::test]
async fn test_late_response_reported_as_timeout() {
    let (mut gateway, sink, _) = gateway_with(GatewayConfig::default());
    let request = AtCommand::Probe.request(Duration::from_millis(10));
    let handle = gateway.send(request, Instant::now()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    sink.feed_slice(b"+AT: OK\r\n");

    let events = gateway.poll(Instant::now()).unwrap();
    assert_eq!(
        events,
        vec![
            GatewayEvent::CommandCompleted(CommandOutcome::TimedOut {
                handle,
                command: "AT".to_string(),
            }),
            GatewayEvent::Unsolicited(Line::new("+AT: OK")),
        ]
    );
    assert_eq!(gateway.stats().timeouts, 1);
}

/// Tests that a response that arrived in time still counts when polled late.
#[tokio::test]
async fn test_response_judged_by_arrival_time() {
    let (mut gateway, sink, _) = gateway_with(GatewayConfig::default());
    let request = AtCommand::Probe.request(Duration::from_millis(20));
    let handle = gateway.send(request, Instant::now()).await.unwrap();

    sink.feed_slice(b"+AT: OK\r\n");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let events = gateway.poll(Instant::now()).unwrap();
    assert_eq!(
        events,
        vec![GatewayEvent::CommandCompleted(CommandOutcome::Success {
            handle,
            line: Line::new("+AT: OK"),
        })]
    );
    assert_eq!(gateway.stats().timeouts, 0);
}

/// Tests that a timeout too large for a deadline waits for the response instead of
/// overflowing.
#[tokio::test]
async fn test_execute_with_unbounded_timeout() {
    let (mut gateway, sink, mock) = gateway_with(GatewayConfig::default());
    let module = spawn_module(sink, mock.clone(), wio_e5);

    let line = gateway
        .execute(AtCommand::Probe.request(Duration::MAX))
        .await
        .unwrap();
    module.abort();
    assert_eq!(line, Line::new("+AT: OK"));
}

/// Tests that waiting for events with an unbounded timeout still sees the response.
#[tokio::test]
async fn test_next_events_with_unbounded_timeout() {
    let (mut gateway, sink, _) = gateway_with(GatewayConfig::default());
    let handle = gateway
        .send(AtCommand::Probe.request(Duration::MAX), Instant::now())
        .await
        .unwrap();

    let feeder = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        sink.feed_slice(b"+AT: OK\r\n");
        sink
    });

    let events = gateway.next_events().await.unwrap();
    let _sink = feeder.await.unwrap();
    assert_eq!(
        events,
        vec![GatewayEvent::CommandCompleted(CommandOutcome::Success {
            handle,
            line: Line::new("+AT: OK"),
        })]
    );
}

/// Tests that events kept during a long command are bounded by the queue depth.
#[tokio::test]
async fn test_deferred_events_bounded_by_queue_depth() {
    let config = GatewayConfig {
        line_queue_depth: 2,
        ..GatewayConfig::default()
    };
    let (mut gateway, sink, mock) = gateway_with(config);

    let feeder = tokio::spawn(async move {
        while mock.written().is_empty() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        for node in [0x10u8, 0x11, 0x12, 0x10] {
            let record = NodeRecord::new(0x59, node, [node; 6]);
            sink.feed_slice(format!("{}\r\n", record.to_rx_line()).as_bytes());
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        sink.feed_slice(b"+AT: OK\r\n");
        sink
    });

    let line = gateway
        .execute(AtCommand::Probe.request(Duration::from_secs(1)))
        .await
        .unwrap();
    let _sink = feeder.await.unwrap();
    assert_eq!(line, Line::new("+AT: OK"));

    let events = gateway.poll(Instant::now()).unwrap();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[1],
        GatewayEvent::NodeUpdated { slot: 0, record } if record.node_id == 0x10
    ));
    assert_eq!(gateway.stats().deferred_dropped, 2);
    assert_eq!(gateway.snapshot().nodes.len(), 3);
}

/// Tests that the gateway notices when the byte side goes away.
#[tokio::test]
async fn test_queue_closed_after_sink_dropped() {
    let (mut gateway, sink, _) = gateway_with(GatewayConfig::default());
    sink.feed_slice(b"+TEST: RX \"591011BA141F172F\"\n");
    drop(sink);

    assert_eq!(gateway.poll(Instant::now()).unwrap().len(), 1);
    assert!(matches!(gateway.poll(Instant::now()), Err(GatewayError::QueueClosed)));
    assert!(matches!(gateway.next_events().await, Err(GatewayError::QueueClosed)));
}

/// Tests that the registry handle can be read from another thread.
#[tokio::test]
async fn test_shared_registry_snapshot() {
    let (mut gateway, sink, _) = gateway_with(GatewayConfig::default());
    sink.feed_slice(b"+TEST: RX \"591011BA141F172F\"\n");
    gateway.poll(Instant::now()).unwrap();

    let registry = gateway.registry();
    let json = std::thread::spawn(move || {
        let registry = registry.lock().unwrap();
        registry.snapshot().to_json().unwrap()
    })
    .join()
    .unwrap();
    assert!(json.contains("\"params_hex\":\"11BA141F172F\""));
}

/// Tests that a missing serial port is reported.
#[tokio::test]
async fn test_open_missing_serial_port() {
    let result = Gateway::open_serial("/dev/e5-gateway-missing", GatewayConfig::default());
    assert!(matches!(result, Err(GatewayError::SerialPortError(_))));
}
