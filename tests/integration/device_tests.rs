//! Device tasks against the simulated bus at the board's real addresses.

use crate::mock_hw::{ENCODER_REG_PULSES, HUB_READ_CONDUCTIVITY, THERMO_REG_TEMPERATURE, THERMO_REG_VERSION};

use stirtank::bus::downstream::PortHub;
use stirtank::bus::sim::SimBus;
use stirtank::bus::upstream::UpstreamMux;
use stirtank::bus::{BusArbiter, SharedBus};
use stirtank::config::FlowCalibration;
use stirtank::error::{Error, SensorError};
use stirtank::pins;
use stirtank::sensors::conductivity::ConductivityTask;
use stirtank::sensors::filter::RollingAverage;
use stirtank::sensors::flow::FlowTask;
use stirtank::sensors::pulse::ExtEncoder;
use stirtank::sensors::thermocouple::ThermocoupleTask;

fn shared(sim: &SimBus) -> SharedBus<SimBus> {
    BusArbiter::new(sim.clone(), UpstreamMux::new(pins::UPSTREAM_MUX_ADDR)).shared()
}

#[test]
fn conductivity_at_reference_temperature() {
    let sim = SimBus::new();
    sim.attach(pins::PORT_HUB_ADDR, pins::PORT_HUB);
    sim.respond(pins::PORT_HUB_ADDR, HUB_READ_CONDUCTIVITY, &2048u16.to_le_bytes());
    let hub = PortHub::new(pins::PORT_HUB_ADDR, pins::PORT_HUB);
    let mut task = ConductivityTask::new(shared(&sim), hub, pins::PATH_CONDUCTIVITY, 1.0);

    // 1650 mV across the probe board at 25 °C
    let ec = task.sample().unwrap();
    assert!((ec - 7.26).abs() < 0.01, "{ec}");
}

#[test]
fn rolling_average_of_five() {
    let mut avg = RollingAverage::new(5);
    let mut last = 0.0;
    for v in [10.0, 20.0, 30.0, 40.0, 50.0] {
        last = avg.push(v);
    }
    assert!((last - 30.0).abs() < 1e-6);
    // The oldest sample drops out.
    assert!((avg.push(60.0) - 40.0).abs() < 1e-6);
}

#[test]
fn select_failure_keeps_last_value() {
    let sim = SimBus::new();
    sim.attach(pins::THERMOCOUPLE_ADDR, pins::PORT_THERMOCOUPLE);
    sim.respond(pins::THERMOCOUPLE_ADDR, THERMO_REG_VERSION, &[0]);
    sim.respond(pins::THERMOCOUPLE_ADDR, THERMO_REG_TEMPERATURE, &(22u16 * 16).to_be_bytes());
    let mut task = ThermocoupleTask::new(shared(&sim), pins::PATH_THERMOCOUPLE, pins::THERMOCOUPLE_ADDR);

    assert!((task.sample().unwrap() - 22.0).abs() < 1e-4);

    sim.set_present(pins::UPSTREAM_MUX_ADDR, false);
    assert!(matches!(task.sample(), Err(Error::Bus(_))));
    assert_eq!(task.last_value(), Some(22.0));
}

#[test]
fn implausible_thermocouple_reading_is_dropped() {
    let sim = SimBus::new();
    sim.attach(pins::THERMOCOUPLE_ADDR, pins::PORT_THERMOCOUPLE);
    sim.respond(pins::THERMOCOUPLE_ADDR, THERMO_REG_VERSION, &[0]);
    sim.respond(pins::THERMOCOUPLE_ADDR, THERMO_REG_TEMPERATURE, &(30u16 * 16).to_be_bytes());
    sim.respond(pins::THERMOCOUPLE_ADDR, THERMO_REG_TEMPERATURE, &i16::MAX.to_be_bytes());
    let mut task = ThermocoupleTask::new(shared(&sim), pins::PATH_THERMOCOUPLE, pins::THERMOCOUPLE_ADDR);

    task.sample().unwrap();
    // 0x7FFF / 16 ≈ 2048 °C, above the K-type range.
    assert!(matches!(
        task.sample(),
        Err(Error::SensorInvalid(SensorError::OutOfRange(_)))
    ));
    assert_eq!(task.last_value(), Some(30.0));
}

#[test]
fn flow_counter_wrap_reads_positive() {
    let sim = SimBus::new();
    sim.attach(pins::ENCODER_UNIT_ADDR, pins::PORT_FLOW);
    // Another encoder unit shares the address on the stirrer port.
    sim.attach(pins::ENCODER_UNIT_ADDR, pins::PORT_STIRRER);
    sim.respond_at(pins::PORT_FLOW, pins::ENCODER_UNIT_ADDR, ENCODER_REG_PULSES, &(u32::MAX - 99).to_le_bytes());
    sim.respond_at(pins::PORT_FLOW, pins::ENCODER_UNIT_ADDR, ENCODER_REG_PULSES, &50u32.to_le_bytes());
    let cal = FlowCalibration {
        flow_k: 7.5,
        flow_correct_k: 1.0,
        window: 1,
    };
    let mut task = FlowTask::new(shared(&sim), pins::PATH_FLOW, ExtEncoder::new(pins::ENCODER_UNIT_ADDR), cal);

    task.restart(0).unwrap();
    assert_eq!(
        sim.writes_at(pins::PORT_FLOW, pins::ENCODER_UNIT_ADDR),
        vec![vec![ENCODER_REG_PULSES, 0, 0, 0, 0]]
    );
    assert!(sim.writes_at(pins::PORT_STIRRER, pins::ENCODER_UNIT_ADDR).is_empty());

    // Counter jumped near the top: implausible, but it becomes the baseline.
    assert!(task.sample(500).is_err());
    // 150 pulses across the wrap in 500 ms: 300 Hz · 60 / 7.5 = 2400 L/min
    let flow = task.sample(1000).unwrap();
    assert!((flow - 2400.0).abs() < 0.5, "{flow}");
}

#[test]
fn flow_sample_without_elapsed_time_is_rejected() {
    let sim = SimBus::new();
    sim.attach(pins::ENCODER_UNIT_ADDR, pins::PORT_FLOW);
    let mut task = FlowTask::new(
        shared(&sim),
        pins::PATH_FLOW,
        ExtEncoder::new(pins::ENCODER_UNIT_ADDR),
        FlowCalibration::default(),
    );
    task.restart(100).unwrap();
    assert!(matches!(
        task.sample(100),
        Err(Error::SensorInvalid(SensorError::ZeroInterval))
    ));
    assert_eq!(task.last_value(), None);
}
