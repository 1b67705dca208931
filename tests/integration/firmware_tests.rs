//! End-to-end tests of the assembled firmware on a simulated board.

use crate::mock_hw::{DEVICE_ID, Rig, state_topic};

use serde_json::Value;
use stirtank::events::{EventKind, Payload};
use stirtank::pins;
use stirtank::sensors::conductivity::{adc_to_millivolts, ec_from_voltage};

#[test]
fn boot_probes_hubs_and_starts_control() {
    let mut rig = Rig::new();
    rig.boot();
    rig.run_for(1000);

    assert_eq!(rig.events.count(EventKind::BusHubConnected), 1);
    assert_eq!(rig.events.count(EventKind::PortHubConnected), 1);
    assert_eq!(rig.events.count(EventKind::ThermocoupleConnected), 1);
    assert_eq!(rig.events.count(EventKind::BusFault), 0);

    // Both knobs rest in the dead zone: everything runs at zero.
    let stirrer = rig.speeds(pins::PORT_STIRRER);
    assert!(stirrer.len() >= 10);
    assert!(stirrer.iter().all(|&s| s == 0));
    assert!(rig.speeds(pins::PORT_PUMP).iter().all(|&s| s == 0));
}

#[test]
fn offline_boot_keeps_network_tasks_parked() {
    let mut rig = Rig::new();
    rig.boot();
    rig.run_for(1000);

    let sched = rig.firmware.scheduler();
    let tasks = *rig.firmware.tasks();
    assert!(!sched.is_enabled(tasks.broker));
    assert!(!sched.is_enabled(tasks.telemetry));
    assert!(!sched.is_enabled(tasks.bus_probe));
    assert_eq!(rig.broker.connect_attempts(), 0);
    assert!(rig.broker.published().is_empty());
}

#[test]
fn telemetry_flows_once_online() {
    let mut rig = Rig::new();
    rig.bring_network_up();

    let configs: Vec<_> = rig
        .broker
        .published()
        .into_iter()
        .filter(|(t, _)| t.ends_with("/config"))
        .collect();
    assert_eq!(configs.len(), 4);
    assert!(configs.iter().any(|(t, _)| t == &format!("homeassistant/sensor/{DEVICE_ID}/water_temp/config")));

    let states = rig.broker.published_to(&state_topic());
    assert_eq!(states.len(), 1);
    let state: Value = serde_json::from_str(&states[0]).unwrap();
    assert_eq!(state["water_temp"], 35.0);
    assert!(state.get("cond_rate").is_some());
}

#[test]
fn telemetry_batches_between_publishes() {
    let mut rig = Rig::new();
    rig.bring_network_up();
    rig.run_for(2000);

    let states = rig.broker.published_to(&state_topic());
    assert_eq!(states.len(), 2);
    let state: Value = serde_json::from_str(&states[1]).unwrap();
    // Every sensor reported in the last two seconds.
    let obj = state.as_object().unwrap();
    for id in ["cond_rate", "water_temp", "flow_rate", "flow_rate2"] {
        assert!(obj.contains_key(id), "missing {id}");
    }
}

#[test]
fn operator_setpoint_drives_stirrer() {
    let mut rig = Rig::new();
    rig.boot();
    rig.console.feed(b"3#60\n");
    rig.run_for(500);

    assert_eq!(rig.events.payloads(EventKind::SerialSetpoint), vec![Payload::Unsigned(60)]);
    // Encoder reads 0 rpm: 127 + round(1.4 * 60 + 0.1 * 60) = 217
    assert_eq!(rig.speeds(pins::PORT_STIRRER).last(), Some(&217));
}

#[test]
fn operator_identify_request() {
    let mut rig = Rig::new();
    rig.boot();
    rig.console.feed(b"0#\n");
    rig.run_for(500);
    assert!(rig.console.written().contains(&format!("0#{DEVICE_ID}")));
}

#[test]
fn readings_are_echoed_to_console() {
    let mut rig = Rig::new();
    rig.boot();
    assert!(rig.console.written().contains(&"1#35.00".to_owned()));
}

#[test]
fn conductivity_uses_thermocouple_temperature() {
    let mut rig = Rig::new();
    rig.boot();
    rig.run_for(500);

    let expected = ec_from_voltage(adc_to_millivolts(2048), 35.0, 1.0);
    let Some(Payload::Float(last)) = rig.events.payloads(EventKind::Conductivity).last().copied() else {
        panic!("no conductivity reading");
    };
    assert!((last - expected).abs() < 1e-4, "{last} != {expected}");

    // The first sample ran before any temperature arrived.
    let Some(Payload::Float(first)) = rig.events.payloads(EventKind::Conductivity).first().copied() else {
        panic!("no conductivity reading");
    };
    let at_default = ec_from_voltage(adc_to_millivolts(2048), 25.0, 1.0);
    assert!((first - at_default).abs() < 1e-4);
}

#[test]
fn unplugged_device_faults_and_recovers() {
    let mut rig = Rig::new();
    rig.boot();
    rig.sim.set_present(pins::THERMOCOUPLE_ADDR, false);
    rig.run_for(2000);

    let faults = rig.events.payloads(EventKind::BusFault);
    assert_eq!(faults, vec![Payload::Unsigned(u32::from(pins::THERMOCOUPLE_ADDR)); 2]);
    // The rest of the board kept going.
    assert!(rig.speeds(pins::PORT_STIRRER).len() >= 20);

    rig.sim.set_present(pins::THERMOCOUPLE_ADDR, true);
    rig.events.clear();
    rig.run_for(1000);
    assert_eq!(rig.events.payloads(EventKind::Thermocouple), vec![Payload::Float(35.0)]);
    assert_eq!(rig.events.count(EventKind::ThermocoupleConnected), 0);
}

#[test]
fn missing_port_hub_is_reported_not_fatal() {
    let sim = stirtank::bus::sim::SimBus::new();
    sim.attach(pins::HBRIDGE_ADDR, pins::PORT_STIRRER);
    let mut rig = Rig::with_bus(sim);
    rig.boot();
    rig.run_for(300);

    assert_eq!(rig.events.count(EventKind::PortHubError), 1);
    let hub_faults = rig
        .events
        .payloads(EventKind::BusFault)
        .into_iter()
        .filter(|p| *p == Payload::Unsigned(u32::from(pins::PORT_HUB_ADDR)))
        .count();
    // Two knobs and the conductivity probe, four ticks each.
    assert_eq!(hub_faults, 12);
    assert_eq!(rig.speeds(pins::PORT_STIRRER).len(), 4);
}

#[test]
fn bus_scan_follows_port_selection() {
    let rig = Rig::new();
    assert_eq!(rig.firmware.bus().scan(), vec![pins::UPSTREAM_MUX_ADDR]);
    // The multiplexer stays visible once a port is selected.
    assert_eq!(
        rig.firmware.bus().scan_port(pins::PORT_STIRRER),
        Ok(vec![pins::HBRIDGE_ADDR, pins::ENCODER_UNIT_ADDR, pins::UPSTREAM_MUX_ADDR])
    );
}
