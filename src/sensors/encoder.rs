//! Stirrer shaft encoder (external encoder unit, quadrature input).

use embedded_hal::i2c::I2c;

use crate::bus::{ChannelPath, SharedBus};
use crate::error::{Error, SensorError};
use crate::events::{Event, EventHandler, EventKind, Payload};
use crate::scheduler::{Context, Task};

use super::filter::RollingAverage;
use super::pulse::{ExtEncoder, count_delta};
use super::report;

/// Encoder counts per shaft revolution.
pub const PULSES_PER_REV: f32 = 1400.0;
pub const WINDOW: usize = 5;

/// Shaft speed for a count change over `dt_ms`.
pub fn rpm_from_delta(delta: i32, dt_ms: u64) -> Option<f32> {
    if dt_ms == 0 {
        return None;
    }
    Some(delta as f32 / PULSES_PER_REV / dt_ms as f32 * 60_000.0)
}

pub struct EncoderTask<I2C> {
    bus: SharedBus<I2C>,
    path: ChannelPath,
    unit: ExtEncoder,
    average: RollingAverage,
    last_count: i32,
    last_ms: u64,
    last_value: Option<f32>,
}

impl<I2C: I2c> EncoderTask<I2C> {
    pub fn new(bus: SharedBus<I2C>, path: ChannelPath, unit: ExtEncoder) -> Self {
        Self {
            bus,
            path,
            unit,
            average: RollingAverage::new(WINDOW),
            last_count: 0,
            last_ms: 0,
            last_value: None,
        }
    }

    pub fn last_value(&self) -> Option<f32> {
        self.last_value
    }

    /// Take the current count as the baseline at `now_ms`.
    pub fn restart(&mut self, now_ms: u64) -> Result<(), Error> {
        let unit = self.unit;
        self.last_count = self.bus.transaction_at(self.path, |ch| unit.read_count(ch))?;
        self.last_ms = now_ms;
        self.average.clear();
        Ok(())
    }

    /// Read the count and return the smoothed rpm since the last sample.
    pub fn sample(&mut self, now_ms: u64) -> Result<f32, Error> {
        let unit = self.unit;
        let count = self.bus.transaction_at(self.path, |ch| unit.read_count(ch))?;

        let dt_ms = now_ms.saturating_sub(self.last_ms);
        let rpm = rpm_from_delta(count_delta(self.last_count, count), dt_ms)
            .ok_or(SensorError::ZeroInterval)?;
        self.last_count = count;
        self.last_ms = now_ms;

        let smoothed = self.average.push(rpm);
        self.last_value = Some(smoothed);
        Ok(smoothed)
    }
}

impl<I2C: I2c> EventHandler for EncoderTask<I2C> {
    fn handle_event(&mut self, _event: &Event, _ctx: &mut Context<'_>) {}
}

impl<I2C: I2c> Task for EncoderTask<I2C> {
    fn name(&self) -> &'static str {
        "Encoder1"
    }

    fn on_enable(&mut self, ctx: &mut Context<'_>) -> bool {
        if let Err(e) = self.restart(ctx.now_ms()) {
            report(ctx, "Encoder1", e);
        }
        true
    }

    fn step(&mut self, ctx: &mut Context<'_>) {
        match self.sample(ctx.now_ms()) {
            Ok(rpm) => ctx.dispatch(EventKind::Encoder1, Payload::Float(rpm)),
            Err(e) => report(ctx, "Encoder1", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::sim::SimBus;
    use crate::bus::upstream::UpstreamMux;
    use crate::bus::BusArbiter;

    const REG_COUNT: u8 = 0x00;

    fn setup() -> (SimBus, EncoderTask<SimBus>) {
        let sim = SimBus::new();
        sim.attach(0x59, 0);
        let bus = BusArbiter::new(sim.clone(), UpstreamMux::new(0x70)).shared();
        (sim, EncoderTask::new(bus, ChannelPath::upstream(0), ExtEncoder::new(0x59)))
    }

    #[test]
    fn one_rev_per_second_is_sixty_rpm() {
        let near = |v: Option<f32>, want: f32| v.is_some_and(|v| (v - want).abs() < 1e-3);
        assert!(near(rpm_from_delta(1400, 1000), 60.0));
        assert!(near(rpm_from_delta(-140, 100), -60.0));
        assert_eq!(rpm_from_delta(1, 0), None);
    }

    #[test]
    fn sample_uses_baseline_from_restart() {
        let (sim, mut task) = setup();
        sim.respond(0x59, REG_COUNT, &1000i32.to_le_bytes());
        sim.respond(0x59, REG_COUNT, &1140i32.to_le_bytes());
        task.restart(0).unwrap();
        let rpm = task.sample(100).unwrap();
        assert!((rpm - 60.0).abs() < 1e-3);
    }

    #[test]
    fn readings_are_averaged_over_five() {
        let (sim, mut task) = setup();
        sim.respond(0x59, REG_COUNT, &0i32.to_le_bytes());
        for count in [140, 280, 420, 560, 700, 1400] {
            sim.respond(0x59, REG_COUNT, &i32::to_le_bytes(count));
        }
        task.restart(0).unwrap();
        let mut last = 0.0;
        for i in 1..=5 {
            last = task.sample(i * 100).unwrap();
        }
        assert!((last - 60.0).abs() < 1e-3);
        // One fast sample (700 counts in 100 ms = 300 rpm) moves the mean by 240/5.
        let fast = task.sample(600).unwrap();
        assert!((fast - 108.0).abs() < 1e-3);
    }

    #[test]
    fn bus_fault_keeps_last_value() {
        let (sim, mut task) = setup();
        sim.respond(0x59, REG_COUNT, &0i32.to_le_bytes());
        sim.respond(0x59, REG_COUNT, &140i32.to_le_bytes());
        task.restart(0).unwrap();
        let first = task.sample(100).unwrap();
        sim.set_present(0x59, false);
        assert!(matches!(task.sample(200), Err(Error::Bus(_))));
        assert_eq!(task.last_value(), Some(first));
    }
}
