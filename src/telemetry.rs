//! Home Assistant telemetry publisher.
//!
//! Runs only while the broker session is up.  The first step after each
//! enable announces every sensor through MQTT discovery; later steps
//! publish one JSON state object holding whatever arrived since the last
//! successful publish.
//!
//! Topics:
//!
//! | Topic                                      | Payload            |
//! |--------------------------------------------|--------------------|
//! | `homeassistant/sensor/<device>/<id>/config`| discovery document |
//! | `homeassistant/sensor/<device>/state`      | `{ "<id>": value }`|

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::app::ports::Publisher;
use crate::config::Smoothing;
use crate::events::{Event, EventHandler, EventKind};
use crate::scheduler::{Context, Task};

const TOPIC_ROOT: &str = "homeassistant/sensor";
const MANUFACTURER: &str = "M5Stack";
const MODEL: &str = "M5Tough";
const SUGGESTED_AREA: &str = "Analytics Lab";

/// One published sensor.
#[derive(Debug, Clone, Copy)]
pub struct SensorSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub device_class: &'static str,
    pub unit: &'static str,
    pub source: EventKind,
}

pub const SENSORS: [SensorSpec; 4] = [
    SensorSpec {
        id: "cond_rate",
        name: "Water Conductivity",
        device_class: "temperature",
        unit: "ms/cm",
        source: EventKind::Conductivity,
    },
    SensorSpec {
        id: "water_temp",
        name: "Water Temperature",
        device_class: "temperature",
        unit: "°C",
        source: EventKind::Thermocouple,
    },
    SensorSpec {
        id: "flow_rate",
        name: "Flow Rate",
        device_class: "water",
        unit: "l/min",
        source: EventKind::FlowSensor1,
    },
    SensorSpec {
        id: "flow_rate2",
        name: "Flow Rate",
        device_class: "water",
        unit: "l/min",
        source: EventKind::Encoder1,
    },
];

#[derive(Serialize)]
struct DeviceBlock<'a> {
    name: &'a str,
    sw_version: &'a str,
    manufacturer: &'a str,
    model: &'a str,
    suggested_area: &'a str,
    identifiers: [&'a str; 1],
}

#[derive(Serialize)]
struct Discovery<'a> {
    name: String,
    uniq_id: String,
    stat_t: &'a str,
    dev_cla: &'a str,
    val_tpl: String,
    unit_of_meas: &'a str,
    force_update: bool,
    device: DeviceBlock<'a>,
}

pub fn discovery_topic(device: &str, sensor: &SensorSpec) -> String {
    format!("{TOPIC_ROOT}/{device}/{}/config", sensor.id)
}

pub fn state_topic(device: &str) -> String {
    format!("{TOPIC_ROOT}/{device}/state")
}

/// Discovery document for one sensor.
pub fn discovery_payload(device: &str, version: &str, sensor: &SensorSpec) -> serde_json::Result<String> {
    let stat_t = state_topic(device);
    serde_json::to_string(&Discovery {
        name: format!("{device} {}", sensor.name),
        uniq_id: format!("{device}_{}", sensor.id),
        stat_t: &stat_t,
        dev_cla: sensor.device_class,
        val_tpl: format!("{{{{ value_json.{} | is_defined }}}}", sensor.id),
        unit_of_meas: sensor.unit,
        force_update: true,
        device: DeviceBlock {
            name: device,
            sw_version: version,
            manufacturer: MANUFACTURER,
            model: MODEL,
            suggested_area: SUGGESTED_AREA,
            identifiers: [device],
        },
    })
}

/// Readings gathered for one sensor since the last publish.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accumulator {
    value: f32,
    count: u32,
}

impl Accumulator {
    pub fn add(&mut self, sample: f32, smoothing: Smoothing) {
        self.value = match smoothing {
            Smoothing::Mean => {
                let n = self.count as f32;
                (self.value * n + sample) / (n + 1.0)
            }
            Smoothing::Latest => sample,
        };
        self.count = self.count.saturating_add(1);
    }

    pub fn value(&self) -> Option<f32> {
        (self.count > 0).then_some(self.value)
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

pub struct TelemetryTask<P> {
    publisher: P,
    device: String,
    version: &'static str,
    smoothing: Smoothing,
    pending: [Accumulator; SENSORS.len()],
    discovery_sent: bool,
}

impl<P: Publisher> TelemetryTask<P> {
    pub fn new(publisher: P, device: impl Into<String>, version: &'static str, smoothing: Smoothing) -> Self {
        Self {
            publisher,
            device: device.into(),
            version,
            smoothing,
            pending: [Accumulator::default(); SENSORS.len()],
            discovery_sent: false,
        }
    }

    pub fn pending(&self, id: &str) -> Option<Accumulator> {
        SENSORS
            .iter()
            .position(|s| s.id == id)
            .map(|i| self.pending[i])
    }

    /// Announce every sensor.  True only if all of them went out.
    pub fn send_discovery(&mut self) -> bool {
        let mut all_sent = true;
        for sensor in &SENSORS {
            let payload = match discovery_payload(&self.device, self.version, sensor) {
                Ok(p) => p,
                Err(e) => {
                    warn!("Telemetry: discovery for {}: {}", sensor.id, e);
                    all_sent = false;
                    continue;
                }
            };
            if let Err(e) = self.publisher.publish(&discovery_topic(&self.device, sensor), &payload) {
                warn!("Telemetry: discovery for {}: {}", sensor.id, e);
                all_sent = false;
            }
        }
        if all_sent {
            info!("Telemetry: announced {} sensors for '{}'", SENSORS.len(), self.device);
        }
        all_sent
    }

    /// State object for every sensor with fresh readings, or `None` if
    /// nothing arrived since the last publish.
    pub fn state_payload(&self) -> Option<String> {
        let mut map = Map::new();
        for (sensor, acc) in SENSORS.iter().zip(&self.pending) {
            if let Some(v) = acc.value() {
                map.insert(sensor.id.to_owned(), Value::from(v));
            }
        }
        if map.is_empty() {
            return None;
        }
        Some(Value::Object(map).to_string())
    }

    /// Publish pending readings.  Counts are cleared only on success.
    pub fn send_state(&mut self) -> bool {
        let Some(payload) = self.state_payload() else {
            return false;
        };
        match self.publisher.publish(&state_topic(&self.device), &payload) {
            Ok(()) => {
                debug!("Telemetry: {}", payload);
                self.pending.iter_mut().for_each(Accumulator::clear);
                true
            }
            Err(e) => {
                warn!("Telemetry: state publish: {}", e);
                false
            }
        }
    }

    fn record(&mut self, kind: EventKind, sample: f32) {
        for (sensor, acc) in SENSORS.iter().zip(self.pending.iter_mut()) {
            if sensor.source == kind {
                acc.add(sample, self.smoothing);
            }
        }
    }
}

impl<P: Publisher> EventHandler for TelemetryTask<P> {
    fn handle_event(&mut self, event: &Event, ctx: &mut Context<'_>) {
        match event.kind {
            EventKind::MqttConnected => ctx.enable(),
            EventKind::MqttDisconnected => ctx.disable(),
            kind => {
                if let Some(v) = event.payload.as_float().filter(|v| v.is_finite()) {
                    self.record(kind, v);
                }
            }
        }
    }
}

impl<P: Publisher> Task for TelemetryTask<P> {
    fn name(&self) -> &'static str {
        "Telemetry"
    }

    fn on_enable(&mut self, _ctx: &mut Context<'_>) -> bool {
        self.discovery_sent = false;
        self.publisher.is_connected()
    }

    fn step(&mut self, _ctx: &mut Context<'_>) {
        if !self.discovery_sent {
            self.discovery_sent = self.send_discovery();
            if !self.discovery_sent {
                return;
            }
        }
        self.send_state();
    }
}
