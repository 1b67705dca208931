//! Firmware assembly.  Builds the fixed task set and drives it.
//!
//! [`Firmware`] owns the scheduler.  Everything hardware-specific is
//! handed in through [`Adapters`], so the same assembly runs on target
//! with ESP-IDF drivers and on the host with the simulators.
//!
//! ```text
//!  I2c ──────▶ BusArbiter ──▶ device tasks ─┐
//!  WifiDriver ─▶ AssociationTask ───────────┤
//!  BrokerClient ▶ BrokerTask ◀─▶ Telemetry ─┼──▶ Scheduler + EventBus
//!  LineIo ─────▶ EventLog · Command ────────┘
//! ```
//!
//! Registration order is the step order within a tick: event log, then
//! network, then the bus tasks in hub-probe, motor, sensor order.

use embedded_hal::i2c::I2c;
use log::info;

use crate::adapters::log_sink::EventLogTask;
use crate::app::commands::SerialCommandTask;
use crate::app::ports::{BrokerClient, LineIo, WifiDriver};
use crate::bus::downstream::PortHub;
use crate::bus::upstream::UpstreamMux;
use crate::bus::{BusArbiter, SharedBus};
use crate::config::SystemConfig;
use crate::drivers::hbridge::HBridge;
use crate::drivers::motor::MotorTask;
use crate::events::EventKind;
use crate::net::association::AssociationTask;
use crate::net::broker::{BrokerHandle, BrokerTask};
use crate::pins;
use crate::scheduler::{Scheduler, TaskId};
use crate::sensors::angle::AngleTask;
use crate::sensors::conductivity::ConductivityTask;
use crate::sensors::encoder::EncoderTask;
use crate::sensors::flow::FlowTask;
use crate::sensors::probe::BusProbeTask;
use crate::sensors::pulse::ExtEncoder;
use crate::sensors::thermocouple::ThermocoupleTask;
use crate::telemetry::TelemetryTask;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Hardware the firmware runs against.
pub struct Adapters<I2C, W, C, S> {
    pub i2c: I2C,
    pub wifi: W,
    pub broker: C,
    /// Serial console, shared by the event log (writes) and the command
    /// channel (reads and replies).
    pub console: S,
}

/// Ids of every registered task, for inspection.
#[derive(Debug, Clone, Copy)]
pub struct TaskSet {
    pub event_log: TaskId,
    pub wifi: TaskId,
    pub broker: TaskId,
    pub telemetry: TaskId,
    pub command: TaskId,
    pub bus_probe: TaskId,
    pub encoder: TaskId,
    pub stirrer: TaskId,
    pub pump: TaskId,
    pub angle_1: TaskId,
    pub angle_2: TaskId,
    pub conductivity: TaskId,
    pub thermocouple: TaskId,
    pub flow: TaskId,
}

impl TaskSet {
    pub fn all(&self) -> [TaskId; 14] {
        [
            self.event_log,
            self.wifi,
            self.broker,
            self.telemetry,
            self.command,
            self.bus_probe,
            self.encoder,
            self.stirrer,
            self.pump,
            self.angle_1,
            self.angle_2,
            self.conductivity,
            self.thermocouple,
            self.flow,
        ]
    }
}

pub struct Firmware<I2C, C> {
    scheduler: Scheduler,
    tasks: TaskSet,
    bus: SharedBus<I2C>,
    broker: BrokerHandle<C>,
}

impl<I2C, C> Firmware<I2C, C>
where
    I2C: I2c + 'static,
    C: BrokerClient + 'static,
{
    /// Build and register every task.  Nothing runs until [`start`](Self::start).
    pub fn assemble<W, S>(config: &SystemConfig, adapters: Adapters<I2C, W, C, S>) -> Self
    where
        W: WifiDriver + 'static,
        S: LineIo + Clone + 'static,
    {
        let Adapters {
            i2c,
            wifi,
            broker,
            console,
        } = adapters;
        let timing = config.timing;
        let bus = BusArbiter::new(i2c, UpstreamMux::new(pins::UPSTREAM_MUX_ADDR)).shared();
        let hub = PortHub::new(pins::PORT_HUB_ADDR, pins::PORT_HUB);
        let broker = BrokerHandle::new(broker);
        let mut s = Scheduler::new();

        let event_log = s.register(Box::new(EventLogTask::new(console.clone())), timing.event_log_ms);
        let wifi = s.register(
            Box::new(AssociationTask::new(wifi, config.network.clone(), config.net_timing)),
            config.net_timing.associated_poll_ms,
        );
        let broker_task = s.register(
            Box::new(BrokerTask::new(
                broker.clone(),
                config.device_id.clone(),
                config.net_timing.broker_connect_timeout_ms,
            )),
            config.net_timing.broker_ms,
        );
        let telemetry = s.register(
            Box::new(TelemetryTask::new(
                broker.clone(),
                config.device_id.clone(),
                VERSION,
                config.publish_smoothing,
            )),
            timing.publish_ms,
        );
        let command = s.register(
            Box::new(SerialCommandTask::new(console, config.device_id.clone())),
            timing.command_ms,
        );
        let bus_probe = s.register(Box::new(BusProbeTask::new(bus.clone(), hub)), 0);
        let encoder = s.register(
            Box::new(EncoderTask::new(
                bus.clone(),
                pins::PATH_STIRRER,
                ExtEncoder::new(pins::ENCODER_UNIT_ADDR),
            )),
            timing.encoder_ms,
        );
        let stirrer = s.register(
            Box::new(MotorTask::stirrer(
                bus.clone(),
                pins::PATH_STIRRER,
                HBridge::new(pins::HBRIDGE_ADDR),
                config.motor,
            )),
            timing.motor_ms,
        );
        let pump = s.register(
            Box::new(MotorTask::pump(
                bus.clone(),
                pins::PATH_PUMP,
                HBridge::new(pins::HBRIDGE_ADDR),
                config.motor,
            )),
            timing.motor_ms,
        );
        let angle_1 = s.register(
            Box::new(AngleTask::new(
                "Angle1",
                bus.clone(),
                hub,
                pins::PATH_ANGLE_1,
                EventKind::AngleSensor1,
            )),
            timing.angle_ms,
        );
        let angle_2 = s.register(
            Box::new(AngleTask::new(
                "Angle2",
                bus.clone(),
                hub,
                pins::PATH_ANGLE_2,
                EventKind::AngleSensor2,
            )),
            timing.angle_ms,
        );
        let conductivity = s.register(
            Box::new(ConductivityTask::new(
                bus.clone(),
                hub,
                pins::PATH_CONDUCTIVITY,
                config.ec_k_value,
            )),
            timing.conductivity_ms,
        );
        let thermocouple = s.register(
            Box::new(ThermocoupleTask::new(
                bus.clone(),
                pins::PATH_THERMOCOUPLE,
                pins::THERMOCOUPLE_ADDR,
            )),
            timing.thermocouple_ms,
        );
        let flow = s.register(
            Box::new(FlowTask::new(
                bus.clone(),
                pins::PATH_FLOW,
                ExtEncoder::new(pins::ENCODER_UNIT_ADDR),
                config.flow,
            )),
            timing.flow_ms,
        );

        for id in [event_log, broker_task, telemetry, stirrer, pump, conductivity] {
            s.subscribe(id);
        }

        Self {
            scheduler: s,
            tasks: TaskSet {
                event_log,
                wifi,
                broker: broker_task,
                telemetry,
                command,
                bus_probe,
                encoder,
                stirrer,
                pump,
                angle_1,
                angle_2,
                conductivity,
                thermocouple,
                flow,
            },
            bus,
            broker,
        }
    }

    /// Enable every task.  Broker and telemetry drop straight back out
    /// until the network comes up; the bus probe runs once.
    pub fn start(&mut self) {
        for id in self.tasks.all() {
            self.scheduler.enable(id);
        }
        info!("Firmware: {} tasks enabled", self.scheduler.task_count());
    }

    pub fn tick(&mut self, now_ms: u64) {
        self.scheduler.tick(now_ms);
    }

    pub fn tasks(&self) -> &TaskSet {
        &self.tasks
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn bus(&self) -> &SharedBus<I2C> {
        &self.bus
    }

    pub fn broker(&self) -> &BrokerHandle<C> {
        &self.broker
    }
}
