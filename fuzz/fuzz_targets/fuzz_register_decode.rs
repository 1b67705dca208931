//! Fuzz target: device register decoding
//!
//! Serves arbitrary register contents to the thermocouple and flow tasks
//! over the simulated bus.  Whatever the device returns:
//! - No panics
//! - An accepted temperature lies in the K-type range
//! - An accepted flow is finite and non-negative
//!
//! cargo fuzz run fuzz_register_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use stirtank::bus::{BusArbiter, ChannelPath};
use stirtank::bus::sim::SimBus;
use stirtank::bus::upstream::UpstreamMux;
use stirtank::config::FlowCalibration;
use stirtank::sensors::flow::FlowTask;
use stirtank::sensors::pulse::ExtEncoder;
use stirtank::sensors::thermocouple::ThermocoupleTask;

fuzz_target!(|data: &[u8]| {
    let Some((&version, rest)) = data.split_first() else {
        return;
    };

    let sim = SimBus::new();
    sim.attach(0x66, 3);
    sim.attach(0x59, 5);
    sim.respond(0x66, 0xFE, &[version]);
    for pair in rest.chunks_exact(2) {
        sim.respond(0x66, 0x00, pair);
    }
    for word in rest.chunks_exact(4) {
        sim.respond(0x59, 0x70, word);
    }

    let bus = BusArbiter::new(sim.clone(), UpstreamMux::new(0x70)).shared();
    let mut thermo = ThermocoupleTask::new(bus.clone(), ChannelPath::upstream(3), 0x66);
    let mut flow = FlowTask::new(bus, ChannelPath::upstream(5), ExtEncoder::new(0x59), FlowCalibration::default());
    let _ = flow.restart(0);

    for i in 1..=(rest.len() / 2).min(64) {
        if let Ok(t) = thermo.sample() {
            assert!((-200.0..=1372.0).contains(&t), "temperature {t}");
        }
        if let Ok(q) = flow.sample(i as u64 * 500) {
            assert!(q.is_finite() && q >= 0.0, "flow {q}");
        }
    }
});
