//! Console event log.
//!
//! Subscribes to every event and renders it to the logger, standing in for
//! the on-device display.  Bus faults repeat every poll while a device is
//! unplugged, so they are coalesced per address and summarised once per
//! period instead of logged one by one.
//!
//! Readings are also echoed to the serial console as `<index>#<value>`
//! lines for the lab's acquisition software:
//!
//! | Index | Reading                        |
//! |-------|--------------------------------|
//! | `1`   | water temperature (°C)         |
//! | `2`   | inflow (L/min)                 |
//! | `3`   | stirrer speed (rpm, integer)   |
//! | `4`   | conductivity (mS/cm)           |

use log::{debug, info, warn};

use crate::app::ports::LineIo;
use crate::events::{Event, EventHandler, EventKind};
use crate::scheduler::{Context, Task};

/// Console line for a reading, if it has one.
pub fn reading_line(event: &Event) -> Option<String> {
    let v = event.payload.as_float()?;
    match event.kind {
        EventKind::Thermocouple => Some(format!("1#{v:.2}")),
        EventKind::FlowSensor1 => Some(format!("2#{v:.2}")),
        EventKind::Encoder1 => Some(format!("3#{}", v as i32)),
        EventKind::Conductivity => Some(format!("4#{v:.2}")),
        _ => None,
    }
}

pub struct EventLogTask<S> {
    console: S,
    /// `(address, count)` since the last summary.
    faults: Vec<(u8, u32)>,
}

impl<S: LineIo> EventLogTask<S> {
    pub fn new(console: S) -> Self {
        Self {
            console,
            faults: Vec::new(),
        }
    }

    /// Faults seen since the last summary.
    pub fn pending_faults(&self) -> u32 {
        self.faults.iter().map(|&(_, n)| n).sum()
    }

    fn record_fault(&mut self, address: u8) {
        match self.faults.iter_mut().find(|(a, _)| *a == address) {
            Some((_, n)) => *n = n.saturating_add(1),
            None => {
                warn!("Bus: device 0x{:02X} not responding", address);
                self.faults.push((address, 1));
            }
        }
    }
}

impl<S: LineIo> EventHandler for EventLogTask<S> {
    fn handle_event(&mut self, event: &Event, _ctx: &mut Context<'_>) {
        match event.kind {
            EventKind::BusFault => {
                if let Some(addr) = event.payload.as_unsigned() {
                    self.record_fault(addr as u8);
                }
            }
            EventKind::BusHubConnected => info!("Bus: I2C hub connected"),
            EventKind::BusHubError => warn!("Bus: I2C hub error"),
            EventKind::PortHubConnected => info!("Bus: port hub connected"),
            EventKind::PortHubError => warn!("Bus: port hub error"),
            EventKind::ThermocoupleConnected => info!("Thermocouple: connected"),
            EventKind::WifiConnecting => info!("Wifi: connecting"),
            EventKind::WifiConnected => info!("Wifi: connected"),
            EventKind::WifiConnectFailed => {
                warn!("Wifi: failed ({})", event.payload.reason().unwrap_or("unknown"));
            }
            EventKind::WifiDisconnected => warn!("Wifi: disconnected"),
            EventKind::MqttConnected => info!("MQTT: connected"),
            EventKind::MqttDisconnected => warn!("MQTT: disconnected"),
            EventKind::MqttConnectFailed => warn!("MQTT: connect failed"),
            EventKind::SerialSetpoint => info!("Command: stirrer setpoint {:?}", event.payload),
            kind => {
                debug!("{:?}: {:?}", kind, event.payload);
                if let Some(line) = reading_line(event) {
                    self.console.write_line(&line);
                }
            }
        }
    }
}

impl<S: LineIo> Task for EventLogTask<S> {
    fn name(&self) -> &'static str {
        "EventLog"
    }

    fn step(&mut self, _ctx: &mut Context<'_>) {
        if self.faults.is_empty() {
            return;
        }
        let summary = self
            .faults
            .iter()
            .map(|(a, n)| format!("0x{a:02X}×{n}"))
            .collect::<Vec<_>>()
            .join(", ");
        warn!("Bus: {} faults ({})", self.pending_faults(), summary);
        self.faults.clear();
    }
}
