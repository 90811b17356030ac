//! Fuzz target for the `show stat` CSV decoder.
//!
//! Run with: cargo +nightly fuzz run fuzz_stat_parser
//!
//! Decodes arbitrary text as a stat response, then reads every field of
//! every record by header name. Short rows and odd headers must surface as
//! errors or empty values, never as panics.

#![no_main]

use hapadmin_core::wire::{self, MetricValue};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let lines: Vec<&str> = text.lines().collect();
    let Ok(table) = wire::parse_table(&lines) else {
        return;
    };

    let frontends = table.frontends.values();
    let backends = table
        .backends
        .values()
        .flat_map(|entry| entry.stats.iter().chain(entry.servers.values()));
    for record in frontends.chain(backends) {
        for name in record.header().names() {
            if let Ok(value) = record.get(name) {
                let _ = MetricValue::convert(value);
            }
        }
        let _ = record.id("iid");
        let _ = record.to_map();
    }
});
