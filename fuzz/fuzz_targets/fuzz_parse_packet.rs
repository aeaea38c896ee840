#![no_main]

use e5_gateway::payload::parse_packet;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let line = String::from_utf8_lossy(data);
    if let Ok(record) = parse_packet(&line) {
        // Whatever decoded must re-encode to a line that decodes the same way
        assert_eq!(parse_packet(&record.to_rx_line()), Ok(record));
    }
});
