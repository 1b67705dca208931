//! Hall-effect flow meter counted by an external encoder unit.
//!
//! The meter emits pulses at a frequency proportional to flow:
//! `Q [L/min] = f [Hz] · 60 / K`, with `K` from the meter datasheet
//! (e.g. 1420 for the jetless RS 508-2704) and a site correction factor
//! on top.  The encoder unit counts the pulses in a wrapping 32-bit
//! register; the task differentiates it against its own time base.

use embedded_hal::i2c::I2c;
use log::info;

use crate::bus::{ChannelPath, SharedBus};
use crate::config::FlowCalibration;
use crate::error::{Error, SensorError};
use crate::events::{Event, EventHandler, EventKind, Payload};
use crate::scheduler::{Context, Task};

use super::filter::RollingAverage;
use super::pulse::{ExtEncoder, pulse_rate};
use super::{plausible, report};

/// Upper bound of a believable reading, L/min.
const MAX_FLOW: f32 = 1.0e4;

/// Flow in L/min for a pulse frequency.
pub fn flow_from_frequency(freq_hz: f32, cal: &FlowCalibration) -> f32 {
    freq_hz * (60.0 / cal.flow_k) / cal.flow_correct_k
}

pub struct FlowTask<I2C> {
    bus: SharedBus<I2C>,
    path: ChannelPath,
    unit: ExtEncoder,
    cal: FlowCalibration,
    average: RollingAverage,
    last_count: u32,
    last_ms: u64,
    last_value: Option<f32>,
}

impl<I2C: I2c> FlowTask<I2C> {
    pub fn new(bus: SharedBus<I2C>, path: ChannelPath, unit: ExtEncoder, cal: FlowCalibration) -> Self {
        Self {
            bus,
            path,
            unit,
            cal,
            average: RollingAverage::new(cal.window),
            last_count: 0,
            last_ms: 0,
            last_value: None,
        }
    }

    pub fn last_value(&self) -> Option<f32> {
        self.last_value
    }

    /// Zero the hardware counter and restart the time base at `now_ms`.
    pub fn restart(&mut self, now_ms: u64) -> Result<(), Error> {
        let unit = self.unit;
        self.bus.transaction_at(self.path, |ch| unit.set_pulses(ch, 0))?;
        self.last_count = 0;
        self.last_ms = now_ms;
        self.average.clear();
        Ok(())
    }

    /// Read the counter and return the smoothed flow since the last sample.
    pub fn sample(&mut self, now_ms: u64) -> Result<f32, Error> {
        let unit = self.unit;
        let count = self.bus.transaction_at(self.path, |ch| unit.read_pulses(ch))?;

        let dt_ms = now_ms.saturating_sub(self.last_ms);
        let freq = pulse_rate(self.last_count, count, dt_ms).ok_or(SensorError::ZeroInterval)?;
        self.last_count = count;
        self.last_ms = now_ms;

        let flow = plausible(flow_from_frequency(freq, &self.cal), 0.0, MAX_FLOW)?;
        let smoothed = self.average.push(flow);
        self.last_value = Some(smoothed);
        Ok(smoothed)
    }
}

impl<I2C: I2c> EventHandler for FlowTask<I2C> {
    fn handle_event(&mut self, _event: &Event, _ctx: &mut Context<'_>) {}
}

impl<I2C: I2c> Task for FlowTask<I2C> {
    fn name(&self) -> &'static str {
        "Flow1"
    }

    fn on_enable(&mut self, ctx: &mut Context<'_>) -> bool {
        match self.restart(ctx.now_ms()) {
            Ok(()) => info!("Flow1: counter zeroed"),
            Err(e) => report(ctx, "Flow1", e),
        }
        true
    }

    fn step(&mut self, ctx: &mut Context<'_>) {
        match self.sample(ctx.now_ms()) {
            Ok(flow) => ctx.dispatch(EventKind::FlowSensor1, Payload::Float(flow)),
            Err(e) => report(ctx, "Flow1", e),
        }
    }
}
