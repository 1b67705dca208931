//! Fuzz target: serial command channel
//!
//! Feeds arbitrary bytes through `SerialCommandTask` as if typed on the
//! console and checks:
//! - No panics, whatever the line length or encoding
//! - The only reply ever written is the identify response
//! - Every emitted setpoint fits the 16-bit command range
//!
//! cargo fuzz run fuzz_command_line

#![no_main]

use libfuzzer_sys::fuzz_target;
use stirtank::adapters::sim::{EventRecorder, SimConsole};
use stirtank::app::commands::SerialCommandTask;
use stirtank::events::{EventKind, Payload};
use stirtank::scheduler::Scheduler;

fuzz_target!(|data: &[u8]| {
    let console = SimConsole::new();
    let mut sched = Scheduler::new();
    let (recorder, events) = EventRecorder::new();
    let rec = sched.register(Box::new(recorder), 1000);
    sched.subscribe(rec);
    let id = sched.register(Box::new(SerialCommandTask::new(console.clone(), "fuzz")), 500);
    sched.enable(id);

    // Deliver in a few bursts so partial lines straddle steps.
    for (i, chunk) in data.chunks(97).enumerate() {
        console.feed(chunk);
        sched.tick(i as u64 * 500);
    }
    sched.tick(data.len() as u64 * 500 + 500);

    for line in console.written() {
        assert_eq!(line, "0#fuzz", "unexpected reply {line:?}");
    }
    for payload in events.payloads(EventKind::SerialSetpoint) {
        match payload {
            Payload::Unsigned(v) => assert!(v <= u32::from(u16::MAX)),
            other => panic!("setpoint carried {other:?}"),
        }
    }
});
