//! Rotary angle knob on a hub port (potentiometer into the hub ADC).
//!
//! The knob is wired so that fully clockwise reads near zero; readings are
//! inverted so turning up increases the value, and the bottom of travel is
//! snapped to zero to cover the potentiometer's dead zone.

use embedded_hal::i2c::I2c;

use crate::bus::downstream::PortHub;
use crate::bus::{BusFault, ChannelPath, SharedBus};
use crate::events::{Event, EventHandler, EventKind, Payload};
use crate::scheduler::{Context, Task};

use super::filter::Debounce;
use super::report_fault;

/// ADC full scale (12-bit).
pub const ADC_FULL_SCALE: u16 = 4096;
/// Minimum change, in counts, worth reporting.
pub const DEADBAND: u16 = 10;
/// Inverted values below this read as zero.
pub const DEAD_ZONE: u16 = 280;

/// Invert a raw ADC sample and apply the dead zone.
pub fn knob_position(raw: u16) -> u16 {
    let inverted = ADC_FULL_SCALE.saturating_sub(raw);
    if inverted < DEAD_ZONE { 0 } else { inverted }
}

pub struct AngleTask<I2C> {
    name: &'static str,
    bus: SharedBus<I2C>,
    hub: PortHub,
    path: ChannelPath,
    kind: EventKind,
    debounce: Debounce,
}

impl<I2C: I2c> AngleTask<I2C> {
    pub fn new(name: &'static str, bus: SharedBus<I2C>, hub: PortHub, path: ChannelPath, kind: EventKind) -> Self {
        Self {
            name,
            bus,
            hub,
            path,
            kind,
            debounce: Debounce::new(DEADBAND),
        }
    }

    /// Read the knob.  `Ok(None)` when it has not moved past the deadband.
    pub fn sample(&mut self) -> Result<Option<u16>, BusFault> {
        let raw = self.hub.analog_read(&self.bus, self.path)?;
        Ok(self.debounce.accept(raw).then(|| knob_position(raw)))
    }
}

impl<I2C: I2c> EventHandler for AngleTask<I2C> {
    fn handle_event(&mut self, _event: &Event, _ctx: &mut Context<'_>) {}
}

impl<I2C: I2c> Task for AngleTask<I2C> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn step(&mut self, ctx: &mut Context<'_>) {
        match self.sample() {
            Ok(Some(position)) => ctx.dispatch(self.kind, Payload::Unsigned(u32::from(position))),
            Ok(None) => {}
            Err(fault) => report_fault(ctx, self.name, fault),
        }
    }
}
