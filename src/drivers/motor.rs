//! Motor output tasks: closed-loop stirrer and open-loop pump.
//!
//! Both drive an H-bridge unit on their own upstream port.  The stirrer
//! closes the loop on encoder speed; the pump writes whatever power the
//! operator dialled in.
//!
//! | Mode        | Setpoint from                          | Feedback       |
//! |-------------|----------------------------------------|----------------|
//! | closed loop | angle knob 1 (0–150 rpm), serial cmd 3 | encoder events |
//! | open loop   | angle knob 2 (0–255 power)             | none           |

use embedded_hal::i2c::I2c;
use log::{debug, info};

use crate::bus::{BusFault, ChannelPath, SharedBus};
use crate::config::MotorTuning;
use crate::control::SpeedController;
use crate::events::{Event, EventHandler, EventKind};
use crate::scheduler::{Context, Task};
use crate::sensors::angle::ADC_FULL_SCALE;
use crate::sensors::report_fault;

use super::hbridge::{Direction, HBridge};

/// Scale a knob reading to `0..=full_scale`.
pub fn scale_knob(raw: u32, full_scale: u32) -> u32 {
    raw * full_scale / u32::from(ADC_FULL_SCALE)
}

enum Mode {
    ClosedLoop {
        controller: SpeedController,
        measured: f32,
    },
    OpenLoop {
        power: u8,
    },
}

pub struct MotorTask<I2C> {
    name: &'static str,
    bus: SharedBus<I2C>,
    path: ChannelPath,
    bridge: HBridge,
    tuning: MotorTuning,
    mode: Mode,
}

impl<I2C: I2c> MotorTask<I2C> {
    /// Speed-controlled stirrer.
    pub fn stirrer(bus: SharedBus<I2C>, path: ChannelPath, bridge: HBridge, tuning: MotorTuning) -> Self {
        Self {
            name: "Stirrer",
            bus,
            path,
            bridge,
            tuning,
            mode: Mode::ClosedLoop {
                controller: SpeedController::new(tuning),
                measured: 0.0,
            },
        }
    }

    /// Fixed-power pump.
    pub fn pump(bus: SharedBus<I2C>, path: ChannelPath, bridge: HBridge, tuning: MotorTuning) -> Self {
        Self {
            name: "Pump",
            bus,
            path,
            bridge,
            tuning,
            mode: Mode::OpenLoop { power: 0 },
        }
    }

    /// Target speed (closed loop) or power (open loop).  Knob and serial
    /// setpoints only reach the mode they apply to.
    pub fn setpoint(&self) -> f32 {
        match &self.mode {
            Mode::ClosedLoop { controller, .. } => controller.setpoint(),
            Mode::OpenLoop { power } => f32::from(*power),
        }
    }

    /// Accumulated speed error (closed loop), `0` otherwise.
    pub fn integral(&self) -> f32 {
        match &self.mode {
            Mode::ClosedLoop { controller, .. } => controller.integral(),
            Mode::OpenLoop { .. } => 0.0,
        }
    }

    pub fn set_rpm(&mut self, rpm: f32) {
        if let Mode::ClosedLoop { controller, .. } = &mut self.mode {
            controller.set_target(rpm);
            debug!("{}: setpoint {:.0} rpm", self.name, controller.setpoint());
        }
    }

    pub fn set_power(&mut self, power: u32) {
        if let Mode::OpenLoop { power: p } = &mut self.mode {
            let max = self.tuning.max_output as u32;
            *p = power.min(max).min(u32::from(u8::MAX)) as u8;
        }
    }

    /// Run one control step against the hardware.  Returns the value
    /// written, `Ok(None)` if the step was skipped.
    ///
    /// The controller only advances once the speed write has gone through.
    pub fn drive(&mut self) -> Result<Option<u8>, BusFault> {
        let Self {
            bus,
            path,
            bridge,
            mode,
            ..
        } = self;
        bus.transaction_at(*path, |ch| match mode {
            Mode::ClosedLoop {
                controller,
                measured,
            } => {
                let Some(step) = controller.plan(*measured) else {
                    return Ok(None);
                };
                bridge.set_speed(ch, step.output())?;
                controller.commit(step);
                Ok(Some(step.output()))
            }
            Mode::OpenLoop { power } => {
                bridge.set_speed(ch, *power)?;
                Ok(Some(*power))
            }
        })
    }
}

impl<I2C: I2c> EventHandler for MotorTask<I2C> {
    fn handle_event(&mut self, event: &Event, _ctx: &mut Context<'_>) {
        let tuning = self.tuning;
        match event.kind {
            EventKind::Encoder1 => {
                if let (Mode::ClosedLoop { measured, .. }, Some(rpm)) =
                    (&mut self.mode, event.payload.as_float())
                {
                    *measured = rpm;
                }
            }
            EventKind::AngleSensor1 => {
                if let Some(raw) = event.payload.as_unsigned() {
                    self.set_rpm(scale_knob(raw, tuning.knob_full_scale_rpm) as f32);
                }
            }
            EventKind::SerialSetpoint => {
                if let Some(rpm) = event.payload.as_unsigned() {
                    self.set_rpm(rpm as f32);
                }
            }
            EventKind::AngleSensor2 => {
                if let Some(raw) = event.payload.as_unsigned() {
                    self.set_power(scale_knob(raw, tuning.knob_full_scale_power));
                }
            }
            _ => {}
        }
    }
}

impl<I2C: I2c> Task for MotorTask<I2C> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn on_enable(&mut self, ctx: &mut Context<'_>) -> bool {
        let bridge = self.bridge;
        match self
            .bus
            .transaction_at(self.path, |ch| bridge.set_direction(ch, Direction::Forward))
        {
            Ok(()) => info!("{}: H-bridge forward on port {}", self.name, self.path),
            Err(fault) => report_fault(ctx, self.name, fault),
        }
        true
    }

    fn step(&mut self, ctx: &mut Context<'_>) {
        if let Err(fault) = self.drive() {
            report_fault(ctx, self.name, fault);
        }
    }
}
