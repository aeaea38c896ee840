#![no_main]

use e5_gateway::link::framer::LineFramer;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // First byte picks the line limit so short and long limits both get exercised
    let max_len = data.first().map_or(1, |b| *b as usize + 1);
    let mut framer = LineFramer::new(max_len);

    for &byte in data.iter().skip(1) {
        if let Ok(Some(line)) = framer.feed(byte) {
            assert!(line.as_str().starts_with('+'));
            assert!(!line.as_str().contains('\n'));
        }
    }

    let stats = framer.stats();
    assert!(stats.lines + stats.malformed + stats.resyncs <= data.len() as u64);
});
