//! Simulated board for integration tests.
//!
//! Populates a `SimBus` with every device the controller expects, at the
//! real addresses and ports, and wraps a fully assembled `Firmware` with
//! a millisecond clock the test advances by hand.

use stirtank::adapters::sim::{EventRecorder, RecordedEvents, SimBroker, SimConsole, SimWifi};
use stirtank::app::service::{Adapters, Firmware};
use stirtank::bus::sim::SimBus;
use stirtank::config::SystemConfig;
use stirtank::pins;

pub const DEVICE_ID: &str = "tank-01";

pub const CONFIG: &str = r#"{
    "deviceId": "tank-01",
    "wifiUser": "lab@example.ac.uk",
    "wifiPass": "hunter22",
    "mqttServer": "broker.local",
    "mqttPort": 1883,
    "flowK": 7.5
}"#;

/// Port hub analog-read commands.
pub const HUB_READ_ANGLE_1: u8 = 0x46;
pub const HUB_READ_ANGLE_2: u8 = 0x56;
pub const HUB_READ_CONDUCTIVITY: u8 = 0x66;

pub const THERMO_REG_TEMPERATURE: u8 = 0x00;
pub const THERMO_REG_VERSION: u8 = 0xFE;
pub const ENCODER_REG_COUNT: u8 = 0x00;
pub const ENCODER_REG_PULSES: u8 = 0x70;

pub fn state_topic() -> String {
    format!("homeassistant/sensor/{DEVICE_ID}/state")
}

/// Bus with every device attached.  Knobs rest at the dead zone, the
/// probe reads mid-scale and the thermocouple (standard variant) reads
/// 35 °C.
pub fn populated_bus() -> SimBus {
    let sim = SimBus::new();
    sim.attach(pins::PORT_HUB_ADDR, pins::PORT_HUB);
    sim.attach(pins::HBRIDGE_ADDR, pins::PORT_STIRRER);
    sim.attach(pins::HBRIDGE_ADDR, pins::PORT_PUMP);
    sim.attach(pins::ENCODER_UNIT_ADDR, pins::PORT_STIRRER);
    sim.attach(pins::ENCODER_UNIT_ADDR, pins::PORT_FLOW);
    sim.attach(pins::THERMOCOUPLE_ADDR, pins::PORT_THERMOCOUPLE);

    sim.respond(pins::PORT_HUB_ADDR, HUB_READ_ANGLE_1, &4096u16.to_le_bytes());
    sim.respond(pins::PORT_HUB_ADDR, HUB_READ_ANGLE_2, &4096u16.to_le_bytes());
    sim.respond(pins::PORT_HUB_ADDR, HUB_READ_CONDUCTIVITY, &2048u16.to_le_bytes());
    sim.respond(pins::THERMOCOUPLE_ADDR, THERMO_REG_VERSION, &[0]);
    sim.respond(pins::THERMOCOUPLE_ADDR, THERMO_REG_TEMPERATURE, &(35u16 * 16).to_be_bytes());
    sim
}

pub struct Rig {
    pub sim: SimBus,
    pub wifi: SimWifi,
    pub broker: SimBroker,
    pub console: SimConsole,
    pub firmware: Firmware<SimBus, SimBroker>,
    pub events: RecordedEvents,
    pub now: u64,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self::with_bus(populated_bus())
    }

    pub fn with_bus(sim: SimBus) -> Self {
        let config = SystemConfig::from_json(CONFIG).expect("valid config");
        let wifi = SimWifi::new();
        let broker = SimBroker::new();
        let console = SimConsole::new();
        let mut firmware = Firmware::assemble(
            &config,
            Adapters {
                i2c: sim.clone(),
                wifi: wifi.clone(),
                broker: broker.clone(),
                console: console.clone(),
            },
        );
        let (recorder, events) = EventRecorder::new();
        let rec = firmware.scheduler_mut().register(Box::new(recorder), 1000);
        firmware.scheduler_mut().subscribe(rec);
        Self {
            sim,
            wifi,
            broker,
            console,
            firmware,
            events,
            now: 0,
        }
    }

    /// Start the firmware and run the first tick.
    pub fn boot(&mut self) {
        self.firmware.start();
        self.firmware.tick(self.now);
    }

    /// Advance the clock in 100 ms ticks until `ms` have passed.
    pub fn run_for(&mut self, ms: u64) {
        let end = self.now + ms;
        while self.now < end {
            self.now += 100;
            self.firmware.tick(self.now);
        }
    }

    /// Make the network reachable and let the firmware associate.
    pub fn bring_network_up(&mut self) {
        self.wifi.add_ap("eduroam", 1, -55);
        self.boot();
        self.wifi.set_status(stirtank::app::ports::LinkStatus::Connected);
        self.run_for(100);
    }

    /// Speeds written to the H-bridge on `port`.
    pub fn speeds(&self, port: u8) -> Vec<u8> {
        self.sim
            .writes_at(port, pins::HBRIDGE_ADDR)
            .into_iter()
            .filter(|w| w.len() == 2 && w[0] == 0x01)
            .map(|w| w[1])
            .collect()
    }
}
