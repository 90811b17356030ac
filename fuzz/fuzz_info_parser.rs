//! Fuzz target for the `show info` decoder.
//!
//! Run with: cargo +nightly fuzz run fuzz_info_parser

#![no_main]

use hapadmin_core::wire;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let lines: Vec<&str> = text.lines().collect();
    let info = wire::parse_info(&lines);
    for value in info.values() {
        let _ = wire::MetricValue::convert(value);
    }
});
